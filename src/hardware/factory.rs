//! Device factory contract.
//!
//! A factory is registered under one scheme and builds a driver from a parsed
//! [`Uri`]. Factories are shared across every construction call for their
//! scheme (`Arc<dyn DeviceFactory<D>>`), possibly from several threads at
//! once, so they must be stateless or internally synchronised.
//!
//! Factories receive the registry that dispatched to them. Wrapping drivers
//! (`convert://<inner uri>`) use it to construct their input device through
//! the same alias and factory tables.
//!
//! # Example
//!
//! ```rust,ignore
//! registry.register_factory(
//!     "test",
//!     FnFactory::new("Test pattern", |uri, _registry| {
//!         let width = uri.param_or("width", 640u32)?;
//!         Ok(Arc::new(TestPattern::new(width, 480)) as Arc<dyn CameraDriver>)
//!     })
//!     .with_param(ParamSpec::new("width", "640", "Image width in pixels")),
//! );
//! ```

use super::capabilities::DeviceInterface;
use super::registry::DeviceRegistry;
use crate::error::HalResult;
use crate::uri::Uri;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One recognised construction parameter.
///
/// Declarations document a factory's accepted parameters; they are not
/// enforced when the device is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamSpec {
    /// Parameter key as written in the URI
    pub name: String,
    /// Default value used when the key is absent
    pub default: String,
    /// Effect of the parameter
    pub description: String,
}

impl ParamSpec {
    /// Declare a parameter.
    pub fn new(
        name: impl Into<String>,
        default: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            description: description.into(),
        }
    }
}

/// Builds drivers of interface `D` from URIs.
pub trait DeviceFactory<D: ?Sized + DeviceInterface>: Send + Sync + 'static {
    /// Human-readable name for listings and logs.
    fn name(&self) -> &str;

    /// Parameters this factory recognises.
    fn params(&self) -> Vec<ParamSpec> {
        Vec::new()
    }

    /// Construct a fully initialised driver.
    ///
    /// `uri` is the final URI after alias rewriting. `registry` is the
    /// registry that dispatched here.
    ///
    /// # Errors
    /// Returns [`crate::error::HalError::Construction`] (or whatever a nested
    /// `create` returned) when the driver cannot be built.
    fn get_device(&self, uri: &Uri, registry: &DeviceRegistry<D>) -> HalResult<Arc<D>>;
}

type BuildFn<D> = dyn Fn(&Uri, &DeviceRegistry<D>) -> HalResult<Arc<D>> + Send + Sync;

/// Factory backed by a closure.
pub struct FnFactory<D: ?Sized + DeviceInterface> {
    name: String,
    params: Vec<ParamSpec>,
    build: Box<BuildFn<D>>,
}

impl<D: ?Sized + DeviceInterface> FnFactory<D> {
    /// Wrap `build` as a factory named `name`.
    pub fn new<F>(name: impl Into<String>, build: F) -> Self
    where
        F: Fn(&Uri, &DeviceRegistry<D>) -> HalResult<Arc<D>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: Vec::new(),
            build: Box::new(build),
        }
    }

    /// Declare a recognised parameter.
    pub fn with_param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }
}

impl<D: ?Sized + DeviceInterface> DeviceFactory<D> for FnFactory<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn params(&self) -> Vec<ParamSpec> {
        self.params.clone()
    }

    fn get_device(&self, uri: &Uri, registry: &DeviceRegistry<D>) -> HalResult<Arc<D>> {
        (self.build)(uri, registry)
    }
}

impl<D: ?Sized + DeviceInterface> fmt::Debug for FnFactory<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnFactory")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Summary of a registered factory for introspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FactoryInfo {
    /// Scheme the factory is registered under
    pub scheme: String,
    /// Human-readable name
    pub name: String,
    /// Declared parameters
    pub params: Vec<ParamSpec>,
}
