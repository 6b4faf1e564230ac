use std::io::Write;
use std::path::Path;

use oam_index::devices::DeviceNameMap;
use oam_index::diagnostics::Diagnostics;
use oam_index::load_config::load_config;

#[test]
fn loads_minimal_config_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "devices_file: data/devices_mapping.json").expect("write");
    writeln!(file, "output_dir: out").expect("write");

    let config = load_config(file.path()).expect("minimal config loads");
    assert_eq!(config.org.org_name, "OpenKNX");
    assert_eq!(config.selection.app_prefix, "OAM-");
    assert!(config.selection.special_names.contains("SOM-UP"));
    assert!(config.selection.exclusions.contains("OAM-TestApp"));
    assert!(config.modules.is_suppressed("OFM-SmartMF"));
    assert_eq!(config.brand_marker, "OpenKNX");
    assert_eq!(config.placeholder_description, "(no description)");
    assert_eq!(config.output_dir, Path::new("out"));
}

#[test]
fn explicit_values_override_defaults() {
    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    write!(
        file,
        "devices_file: rules.json\n\
         output_dir: site/data\n\
         brand_marker: Acme\n\
         org:\n\
         \x20 api_base_url: https://ghe.example.org/api/v3\n\
         \x20 raw_base_url: https://ghe.example.org/raw\n\
         \x20 org_name: Acme\n\
         selection:\n\
         \x20 app_prefix: \"APP-\"\n"
    )
    .expect("write");

    let config = load_config(file.path()).expect("config loads");
    assert_eq!(config.org.org_name, "Acme");
    assert_eq!(config.org.api_base_url, "https://ghe.example.org/api/v3");
    assert_eq!(config.selection.app_prefix, "APP-");
    assert!(
        config.selection.special_names.is_empty(),
        "an explicit selection block replaces the default sets"
    );
    assert_eq!(config.brand_marker, "Acme");
}

#[test]
fn missing_file_and_invalid_yaml_are_reported() {
    assert!(load_config("/nonexistent/oam-index.yaml").is_err());

    let mut file = tempfile::NamedTempFile::new().expect("tempfile");
    writeln!(file, "output_dir: [unclosed").expect("write");
    assert!(load_config(file.path()).is_err());
}

#[test]
fn shipped_example_config_is_valid() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let config = load_config(root.join("config.example.yaml")).expect("example config loads");
    assert_eq!(config.org.org_name, "OpenKNX");
    assert_eq!(config.devices_file, Path::new("data/devices_mapping.json"));
}

#[test]
fn shipped_device_rules_load_and_normalize() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR"));
    let devices = DeviceNameMap::load(&root.join("data/devices_mapping.json"), "OpenKNX")
        .expect("shipped rule file loads");
    assert!(!devices.is_empty());

    let mut diagnostics = Diagnostics::new();
    assert_eq!(
        devices.normalize("OAM-Any", "UP1", &mut diagnostics),
        "OpenKNX UP1"
    );
    // Qualified rule wins for its application only.
    assert_eq!(
        devices.normalize("OAM-PresenceModule", "UP1", &mut diagnostics),
        "OpenKNX UP1 Pr\u{00e4}senzmelder"
    );
    assert!(devices.is_first_party("OpenKNX UP1"));
    assert!(!devices.is_first_party("AB-SmartHouse PresenceMultisensor"));
}
