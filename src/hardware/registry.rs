//! Device Registry
//!
//! One `DeviceRegistry` exists per device category. It maps scheme strings to
//! [`DeviceFactory`] instances and to alias targets, and turns a device URI
//! into a live driver.
//!
//! # Resolution
//!
//! ```text
//! create("bumblebee://cam0")
//!   │
//!   ├─ simulation enabled? ── yes ──► factory["Node" + hint]  (aliases bypassed)
//!   │
//!   ├─ alias["bumblebee"] = "debayer://dc1394://"
//!   │     rewrite ──► "debayer://dc1394://cam0"
//!   ├─ alias["debayer"]? no
//!   │
//!   └─ factory["debayer"].get_device(uri) ──► Arc<dyn CameraDriver>
//! ```
//!
//! Alias rewriting is iterative: the alias target replaces the scheme and the
//! original remainder is appended unchanged. Schemes expanded during one
//! resolution are tracked and a repeat fails with [`HalError::CyclicAlias`].
//!
//! # Thread Safety
//!
//! Both tables sit behind `RwLock`s. Lookups take a read lock and clone the
//! factory `Arc` out before constructing, so a slow factory never blocks
//! registration or other `create` calls, and a factory may call back into the
//! registry for its inner device.
//!
//! The registry keeps no reference to the drivers it builds. A driver lives
//! until the caller's last handle is dropped.

use super::capabilities::DeviceInterface;
use super::factory::{DeviceFactory, FactoryInfo};
use super::simulation::Simulation;
use crate::error::{HalError, HalResult};
use crate::uri::Uri;
use parking_lot::RwLock;
use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Prefix of the scheme a simulated device is registered under.
pub const SIM_SCHEME_PREFIX: &str = "Node";

/// Aliases every registry starts with.
pub const DEFAULT_ALIASES: [(&str, &str); 2] = [
    ("bumblebee", "debayer://dc1394://"),
    ("twizzler", "deinterlace://v4l://"),
];

/// Maximum depth of `create` calls nested through wrapping factories on one thread.
pub const MAX_NESTING: usize = 32;

thread_local! {
    static NESTING: Cell<usize> = const { Cell::new(0) };
}

/// Tracks how deep factories have recursed into `create` on this thread.
struct NestingGuard;

impl NestingGuard {
    fn enter(uri: &str) -> HalResult<Self> {
        NESTING.with(|depth| {
            if depth.get() >= MAX_NESTING {
                return Err(HalError::Configuration(format!(
                    "device nesting deeper than {MAX_NESTING} levels while creating '{uri}'"
                )));
            }
            depth.set(depth.get() + 1);
            Ok(NestingGuard)
        })
    }
}

impl Drop for NestingGuard {
    fn drop(&mut self) {
        NESTING.with(|depth| depth.set(depth.get().saturating_sub(1)));
    }
}

/// Scheme-keyed factory and alias tables for one device category.
pub struct DeviceRegistry<D: ?Sized + DeviceInterface> {
    factories: RwLock<HashMap<String, Arc<dyn DeviceFactory<D>>>>,
    aliases: RwLock<HashMap<String, String>>,
    simulation: Simulation,
}

impl<D: ?Sized + DeviceInterface> DeviceRegistry<D> {
    /// Registry with the default aliases, sharing `simulation` with its siblings.
    pub fn new(simulation: Simulation) -> Self {
        let registry = Self {
            factories: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            simulation,
        };
        for (name, target) in DEFAULT_ALIASES {
            registry.register_alias(name, target);
        }
        registry
    }

    /// The simulation handle this registry consults.
    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    /// Register a factory for `scheme`, replacing and returning any previous one.
    pub fn register_factory<F>(
        &self,
        scheme: impl Into<String>,
        factory: F,
    ) -> Option<Arc<dyn DeviceFactory<D>>>
    where
        F: DeviceFactory<D>,
    {
        self.register_shared_factory(scheme, Arc::new(factory))
    }

    /// Register an already shared factory, e.g. one serving several schemes.
    pub fn register_shared_factory(
        &self,
        scheme: impl Into<String>,
        factory: Arc<dyn DeviceFactory<D>>,
    ) -> Option<Arc<dyn DeviceFactory<D>>> {
        let scheme = scheme.into();
        info!(
            category = %D::CATEGORY,
            scheme = %scheme,
            name = %factory.name(),
            "Registering device factory"
        );
        let previous = self.factories.write().insert(scheme.clone(), factory);
        if previous.is_some() {
            debug!(category = %D::CATEGORY, scheme = %scheme, "Replaced existing factory");
        }
        previous
    }

    /// Remove the factory for `scheme`.
    pub fn unregister_factory(&self, scheme: &str) -> Option<Arc<dyn DeviceFactory<D>>> {
        self.factories.write().remove(scheme)
    }

    /// Register an alias; `target` is a URI prefix such as `"debayer://dc1394://"`.
    /// Replaces and returns any previous target.
    pub fn register_alias(&self, name: impl Into<String>, target: impl Into<String>) -> Option<String> {
        let name = name.into();
        let target = target.into();
        debug!(category = %D::CATEGORY, alias = %name, target = %target, "Registering alias");
        self.aliases.write().insert(name, target)
    }

    /// Remove an alias.
    pub fn unregister_alias(&self, name: &str) -> Option<String> {
        self.aliases.write().remove(name)
    }

    /// Whether a factory is registered for `scheme`.
    pub fn has_factory(&self, scheme: &str) -> bool {
        self.factories.read().contains_key(scheme)
    }

    /// Registered factory schemes, sorted.
    pub fn schemes(&self) -> Vec<String> {
        let mut schemes: Vec<String> = self.factories.read().keys().cloned().collect();
        schemes.sort();
        schemes
    }

    /// Registered aliases and their targets, sorted by alias.
    pub fn aliases(&self) -> BTreeMap<String, String> {
        self.aliases
            .read()
            .iter()
            .map(|(name, target)| (name.clone(), target.clone()))
            .collect()
    }

    /// Name and declared parameters of the factory for `scheme`.
    pub fn factory_params(&self, scheme: &str) -> Option<FactoryInfo> {
        let factory = self.factory(scheme)?;
        Some(FactoryInfo {
            scheme: scheme.to_string(),
            name: factory.name().to_string(),
            params: factory.params(),
        })
    }

    /// Parse `uri` and construct the device it names.
    ///
    /// `hint` names the device type for simulation mode (e.g. `"Camera"`);
    /// it is required only while simulation is enabled.
    ///
    /// # Errors
    /// - [`HalError::InvalidUri`] if `uri` does not parse
    /// - [`HalError::Configuration`] if simulation is on and `hint` is `None`
    /// - [`HalError::BackendUnavailable`] if the simulator cannot be started
    /// - [`HalError::CyclicAlias`] if alias expansion loops
    /// - [`HalError::UnknownScheme`] if no factory serves the final scheme
    /// - whatever the factory returns, unchanged
    pub fn create(&self, uri: &str, hint: Option<&str>) -> HalResult<Arc<D>> {
        let parsed = Uri::parse(uri)?;
        self.create_uri(&parsed, hint)
    }

    /// Construct the device named by an already parsed URI.
    ///
    /// # Errors
    /// Same as [`create`](Self::create), minus URI parsing of the input.
    pub fn create_uri(&self, uri: &Uri, hint: Option<&str>) -> HalResult<Arc<D>> {
        let _depth = NestingGuard::enter(uri.as_str())?;

        if self.simulation.is_enabled() {
            return self.create_simulated(uri, hint);
        }

        let resolved = self.resolve(uri)?;
        let factory = self.factory(&resolved.scheme).ok_or_else(|| {
            warn!(
                category = %D::CATEGORY,
                scheme = %resolved.scheme,
                uri = %uri,
                "No factory registered for scheme"
            );
            HalError::UnknownScheme {
                scheme: resolved.scheme.clone(),
                uri: uri.to_string(),
            }
        })?;

        debug!(
            category = %D::CATEGORY,
            scheme = %resolved.scheme,
            uri = %resolved,
            factory = %factory.name(),
            "Constructing device"
        );
        factory.get_device(&resolved, self)
    }

    /// Apply alias rewriting until the scheme names no alias.
    ///
    /// The returned URI is what the factory will receive. Resolution does not
    /// check that a factory exists for the final scheme.
    ///
    /// # Errors
    /// [`HalError::CyclicAlias`] when a scheme repeats, [`HalError::InvalidUri`]
    /// when a rewritten string does not parse.
    pub fn resolve(&self, uri: &Uri) -> HalResult<Uri> {
        let mut current = uri.clone();
        let mut visited = HashSet::new();
        let mut chain = Vec::new();

        loop {
            let target = self.aliases.read().get(&current.scheme).cloned();
            let Some(target) = target else {
                return Ok(current);
            };

            if !visited.insert(current.scheme.clone()) {
                warn!(
                    category = %D::CATEGORY,
                    scheme = %current.scheme,
                    uri = %uri,
                    "Alias cycle detected"
                );
                return Err(HalError::CyclicAlias {
                    scheme: current.scheme,
                    uri: uri.to_string(),
                    chain,
                });
            }
            chain.push(current.scheme.clone());

            let rewritten = format!("{target}{}", current.url);
            debug!(
                category = %D::CATEGORY,
                alias = %current.scheme,
                from = %current,
                to = %rewritten,
                "Expanded alias"
            );
            current = Uri::parse(&rewritten)?;
        }
    }

    /// Release a handle obtained from [`create`](Self::create).
    ///
    /// The registry does not track instances; this drops the caller's handle
    /// and the driver is torn down once no other handle remains.
    pub fn destroy(&self, handle: Arc<D>) {
        let remaining = Arc::strong_count(&handle) - 1;
        drop(handle);
        debug!(category = %D::CATEGORY, remaining, "Released device handle");
    }

    fn create_simulated(&self, uri: &Uri, hint: Option<&str>) -> HalResult<Arc<D>> {
        let hint = hint.ok_or_else(|| {
            HalError::Configuration(format!(
                "simulation mode needs a device type hint to create '{uri}'"
            ))
        })?;

        self.simulation.ensure_running()?;

        let scheme = format!("{SIM_SCHEME_PREFIX}{hint}");
        let factory = self.factory(&scheme).ok_or_else(|| HalError::UnknownScheme {
            scheme: scheme.clone(),
            uri: uri.to_string(),
        })?;

        debug!(
            category = %D::CATEGORY,
            scheme = %scheme,
            uri = %uri,
            "Constructing simulated device"
        );
        factory.get_device(uri, self)
    }

    fn factory(&self, scheme: &str) -> Option<Arc<dyn DeviceFactory<D>>> {
        self.factories.read().get(scheme).cloned()
    }
}

impl<D: ?Sized + DeviceInterface> Default for DeviceRegistry<D> {
    fn default() -> Self {
        Self::new(Simulation::disabled())
    }
}

impl<D: ?Sized + DeviceInterface> fmt::Debug for DeviceRegistry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("category", &D::CATEGORY)
            .field("schemes", &self.schemes())
            .field("aliases", &self.aliases())
            .field("simulation", &self.simulation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::capabilities::ImuDriver;
    use crate::hardware::factory::{FnFactory, ParamSpec};
    use crate::messages::ImuMsg;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tracing_test::traced_test;

    /// Records the URI it was built from.
    struct Stub {
        uri: String,
    }

    impl ImuDriver for Stub {
        fn capture(&self) -> HalResult<ImuMsg> {
            Ok(ImuMsg::default())
        }

        fn device_property(&self, name: &str) -> Option<String> {
            (name == "uri").then(|| self.uri.clone())
        }
    }

    fn stub_factory(name: &str) -> FnFactory<dyn ImuDriver> {
        FnFactory::new(name, |uri, _| {
            Ok(Arc::new(Stub {
                uri: uri.to_string(),
            }) as Arc<dyn ImuDriver>)
        })
    }

    fn built_from(device: &Arc<dyn ImuDriver>) -> String {
        device.device_property("uri").unwrap_or_default()
    }

    #[test]
    fn default_aliases_present() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        let aliases = registry.aliases();
        assert_eq!(aliases["bumblebee"], "debayer://dc1394://");
        assert_eq!(aliases["twizzler"], "deinterlace://v4l://");
    }

    #[test]
    fn direct_factory_lookup() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        registry.register_factory("stub", stub_factory("Stub"));
        let device = registry.create("stub://dev0?rate=10", None).unwrap();
        assert_eq!(built_from(&device), "stub://dev0?rate=10");
    }

    #[test]
    #[traced_test]
    fn default_alias_rewrites_prefix() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        registry.register_factory("debayer", stub_factory("Debayer"));
        let device = registry.create("bumblebee://cam0", None).unwrap();
        assert_eq!(built_from(&device), "debayer://dc1394://cam0");
        assert!(logs_contain("Expanded alias"));
        assert!(logs_contain("debayer://dc1394://cam0"));
    }

    #[test]
    fn unknown_scheme_names_resolved_scheme() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        match registry.create("bumblebee://cam0", None) {
            Err(HalError::UnknownScheme { scheme, uri }) => {
                assert_eq!(scheme, "debayer");
                assert_eq!(uri, "bumblebee://cam0");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn self_alias_is_cyclic() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        registry.register_alias("loop", "loop://");
        assert!(matches!(
            registry.create("loop://x", None),
            Err(HalError::CyclicAlias { .. })
        ));
    }

    #[test]
    fn last_registration_wins() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        registry.register_factory("a", stub_factory("first"));
        let previous = registry.register_factory("a", stub_factory("second"));
        assert_eq!(previous.map(|f| f.name().to_string()).as_deref(), Some("first"));
        assert_eq!(registry.factory_params("a").unwrap().name, "second");

        registry.register_factory("b", stub_factory("B"));
        registry.register_factory("c", stub_factory("C"));
        registry.register_alias("x", "b://");
        registry.register_alias("x", "c://");
        let device = registry.create("x://r", None).unwrap();
        assert_eq!(built_from(&device), "c://r");
    }

    #[test]
    fn factory_errors_propagate_unchanged() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        registry.register_factory(
            "broken",
            FnFactory::new("Broken", |uri, _| Err(HalError::construction(uri, "no hardware"))),
        );
        match registry.create("broken://", None) {
            Err(HalError::Construction { scheme, message, .. }) => {
                assert_eq!(scheme, "broken");
                assert_eq!(message, "no hardware");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn invalid_uri_rejected_before_lookup() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        assert!(matches!(
            registry.create("not a uri", None),
            Err(HalError::InvalidUri { .. })
        ));
    }

    #[test]
    fn introspection() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        registry.register_factory(
            "stub",
            stub_factory("Stub").with_param(ParamSpec::new("rate", "100", "Sample rate in Hz")),
        );
        assert!(registry.has_factory("stub"));
        assert_eq!(registry.schemes(), vec!["stub".to_string()]);
        let info = registry.factory_params("stub").unwrap();
        assert_eq!(info.params[0].name, "rate");
        assert!(registry.unregister_factory("stub").is_some());
        assert!(!registry.has_factory("stub"));
        assert!(registry.unregister_alias("twizzler").is_some());
        assert!(!registry.aliases().contains_key("twizzler"));
    }

    #[test]
    fn runaway_factory_recursion_is_bounded() {
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        registry.register_factory(
            "wrap",
            FnFactory::new("Wrap", |uri, registry| registry.create(uri.as_str(), None)),
        );
        assert!(matches!(
            registry.create("wrap://x", None),
            Err(HalError::Configuration(_))
        ));
        NESTING.with(|depth| assert_eq!(depth.get(), 0));
    }

    #[test]
    fn destroy_releases_handle() {
        struct Tracked(Arc<AtomicUsize>);
        impl ImuDriver for Tracked {
            fn capture(&self) -> HalResult<ImuMsg> {
                Ok(ImuMsg::default())
            }
        }
        impl Drop for Tracked {
            fn drop(&mut self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let dropped = Arc::new(AtomicUsize::new(0));
        let registry = DeviceRegistry::<dyn ImuDriver>::default();
        let counter = Arc::clone(&dropped);
        registry.register_factory(
            "tracked",
            FnFactory::new("Tracked", move |_, _| {
                Ok(Arc::new(Tracked(Arc::clone(&counter))) as Arc<dyn ImuDriver>)
            }),
        );

        let device = registry.create("tracked://", None).unwrap();
        let second = Arc::clone(&device);
        registry.destroy(device);
        assert_eq!(dropped.load(Ordering::SeqCst), 0);
        registry.destroy(second);
        assert_eq!(dropped.load(Ordering::SeqCst), 1);
    }
}
