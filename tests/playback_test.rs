//! End-to-end playback through `Hal`: image files, format conversion and
//! recorded logs, constructed purely from URIs and configuration.

use sensor_hal::config::{AliasDefinition, HalConfig};
use sensor_hal::hardware::capabilities::properties;
use sensor_hal::messages::{LidarMsg, PixelFormat, PixelType};
use sensor_hal::{DeviceCategory, Hal, HalError};
use std::fs;
use std::io::Write;
use std::path::Path;

fn write_pgm(dir: &Path, name: &str, width: u32, height: u32, value: u8) {
    let mut bytes = format!("P5\n{width} {height}\n255\n").into_bytes();
    bytes.extend(std::iter::repeat(value).take((width * height) as usize));
    fs::write(dir.join(name), bytes).unwrap();
}

fn write_ppm(dir: &Path, name: &str, rgb: [u8; 3]) {
    let mut bytes = b"P6\n1 1\n255\n".to_vec();
    bytes.extend_from_slice(&rgb);
    fs::write(dir.join(name), bytes).unwrap();
}

#[test]
fn stereo_pair_plays_in_lockstep() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..3u8 {
        write_pgm(dir.path(), &format!("left_{i}.pgm"), 8, 4, i);
        write_pgm(dir.path(), &format!("right_{i}.pgm"), 8, 4, 100 + i);
    }

    let hal = Hal::from_config(&HalConfig::default()).unwrap();
    let camera = hal
        .cameras()
        .create(&format!("file://{}/[left_*.pgm,right_*.pgm]", dir.path().display()), None)
        .unwrap();

    assert_eq!(camera.num_channels(), 2);
    assert_eq!(camera.device_property(properties::NUM_IMAGES).as_deref(), Some("3"));
    for i in 0..3u8 {
        let frame = camera.capture().unwrap();
        assert_eq!(frame.images[0].data[0], i);
        assert_eq!(frame.images[1].data[0], 100 + i);
        assert_eq!(frame.images[0].serial_number, frame.images[1].serial_number);
    }
    assert!(matches!(camera.capture(), Err(HalError::EndOfStream)));
}

#[test]
fn configured_alias_and_loop_default() {
    let dir = tempfile::tempdir().unwrap();
    write_ppm(dir.path(), "a.ppm", [255, 0, 0]);
    write_ppm(dir.path(), "b.ppm", [0, 0, 255]);

    let mut config = HalConfig::default();
    config.capture.loop_playback = true;
    config.aliases.push(AliasDefinition {
        category: DeviceCategory::Camera,
        name: "gray".to_string(),
        target: "convert:[fmt=MONO8]//file://".to_string(),
    });
    let hal = Hal::from_config(&config).unwrap();

    let camera = hal
        .cameras()
        .create(&format!("gray://{}/*.ppm", dir.path().display()), None)
        .unwrap();
    let values: Vec<u8> = (0..4)
        .map(|_| {
            let image = camera.capture().unwrap().images.remove(0);
            assert_eq!(image.format, PixelFormat::Luminance);
            assert_eq!(image.pixel_type, PixelType::UnsignedByte);
            image.data[0]
        })
        .collect();
    assert_eq!(values, vec![76, 29, 76, 29]);
}

#[test]
fn missing_files_fail_construction() {
    let dir = tempfile::tempdir().unwrap();
    let hal = Hal::from_config(&HalConfig::default()).unwrap();
    let result = hal
        .cameras()
        .create(&format!("file://{}/*.pgm", dir.path().display()), None);
    assert!(matches!(result, Err(HalError::Construction { scheme, .. }) if scheme == "file"));
}

#[test]
fn lidar_log_through_proto_scheme() {
    let mut log = tempfile::NamedTempFile::new().unwrap();
    for i in 0..3 {
        let msg = LidarMsg {
            device_time: f64::from(i),
            rotational_position: 10.0 * f64::from(i),
            distances: vec![1.0, 2.0],
            ..LidarMsg::default()
        };
        writeln!(log, "{}", serde_json::to_string(&msg).unwrap()).unwrap();
    }

    let hal = Hal::from_config(&HalConfig::default()).unwrap();
    let lidar = hal
        .lidars()
        .create(&format!("proto://{}", log.path().display()), None)
        .unwrap();

    let angles: Vec<f64> = (0..3)
        .map(|_| lidar.capture().unwrap().rotational_position)
        .collect();
    assert_eq!(angles, vec![0.0, 10.0, 20.0]);
    assert!(matches!(lidar.capture(), Err(HalError::EndOfStream)));
    hal.lidars().destroy(lidar);
}

#[test]
fn shipped_config_is_valid() {
    let config = HalConfig::load_from(concat!(env!("CARGO_MANIFEST_DIR"), "/config/sensor_hal.toml")).unwrap();
    assert!(config.validate().is_ok());
    assert!(Hal::from_config(&config).is_ok());
}
