//! Unit tests for manifest parsing.

use rstest::{fixture, rstest};

use super::*;

const SAMPLE: &str = r#"
default_service = "main"

[env]
SITE = "lab"
RETRIES = 3

[services.main]
default_directory = "system"
config = { owner = "ops" }

[services.main.directories.system]
path = "/usr/lib/rpcd/system"
config = { tier = "1" }

[services.main.directories.system.modules.echo]
greeting = "hi"
firewall = [{ name = "msg", required = true, type = "string", regex = "^[a-z]+$" }]

[services.extra.directories.tools]
path = "/opt/tools"
require_handler = true
"#;

#[fixture]
fn origin() -> Utf8PathBuf {
    Utf8PathBuf::from("services.toml")
}

#[rstest]
fn parses_nested_services(origin: Utf8PathBuf) {
    let manifest = ServiceManifest::from_toml_str(SAMPLE, &origin).expect("parse manifest");

    assert_eq!(manifest.default_service_name(), Some("main"));
    assert_eq!(manifest.env.get("SITE"), Some(&Value::from("lab")));
    assert_eq!(manifest.env.get("RETRIES"), Some(&Value::Int(3)));

    let main = manifest.services.get("main").expect("main service");
    assert_eq!(main.config.get("owner"), Some(&Value::from("ops")));
    let system = main.directories.get("system").expect("system directory");
    assert_eq!(system.path, Utf8PathBuf::from("/usr/lib/rpcd/system"));
    let echo = system.modules.get("echo").expect("echo fragment");
    assert_eq!(echo.get("greeting"), Some(&Value::from("hi")));
    assert!(matches!(echo.get("firewall"), Some(Value::List(rules)) if rules.len() == 1));

    let tools = manifest
        .services
        .get("extra")
        .and_then(|service| service.directories.get("tools"))
        .expect("tools directory");
    assert!(tools.require_handler);
}

#[rstest]
fn rejects_unknown_default_service(origin: Utf8PathBuf) {
    let error = ServiceManifest::from_toml_str("default_service = \"ghost\"", &origin)
        .expect_err("should fail");
    assert!(matches!(error, ManifestError::UnknownDefaultService { ref name } if name == "ghost"));
}

#[rstest]
fn rejects_unknown_default_directory(origin: Utf8PathBuf) {
    let text = "[services.main]\ndefault_directory = \"missing\"\n";
    let error = ServiceManifest::from_toml_str(text, &origin).expect_err("should fail");
    assert!(matches!(
        error,
        ManifestError::UnknownDefaultDirectory { ref directory, .. } if directory == "missing"
    ));
}

#[rstest]
fn rejects_unknown_keys(origin: Utf8PathBuf) {
    let error = ServiceManifest::from_toml_str("surprise = 1", &origin).expect_err("should fail");
    assert!(matches!(error, ManifestError::Parse { .. }));
    assert!(error.to_string().contains("services.toml"));
}

#[test]
fn ad_hoc_directories_join_default_service() {
    let mut manifest = ServiceManifest::default();
    assert!(manifest.has_no_directories());

    let first = manifest.add_module_dir(Utf8Path::new("/srv/a/modules"));
    let second = manifest.add_module_dir(Utf8Path::new("/srv/b/modules"));

    assert_eq!(first, "modules");
    assert_eq!(second, "modules-2");
    assert_eq!(manifest.default_service_name(), Some(DEFAULT_SERVICE_NAME));
    assert!(!manifest.has_no_directories());
}

#[test]
fn missing_file_reports_path() {
    let error = ServiceManifest::load(Utf8Path::new("/nonexistent/rpcd/services.toml"))
        .expect_err("should fail");
    assert!(error.to_string().contains("/nonexistent/rpcd/services.toml"));
}
