//! Crate-level integration and BDD tests.

use rpcd_config::ServiceManifest;
use rpcd_types::Value;

use crate::auth::AuthGate;
use crate::dispatch::Dispatcher;
use crate::registry::{ModuleLoader, Registry};
use crate::request::Request;
use crate::shell::ShellSettings;

mod behaviour;
pub(crate) mod support;

#[test]
fn end_to_end_builtin_echo() {
    let (_guard, dir) = support::module_dir();
    support::touch(&dir, "echo.so");
    support::touch(&dir, "date.so");

    let mut manifest = ServiceManifest::default();
    manifest.add_module_dir(&dir);
    let loader = ModuleLoader::with_settings(ShellSettings::new());
    let registry = Registry::from_manifest(&manifest, &loader).expect("registry");
    registry.init_all().expect("init");
    let dispatcher = Dispatcher::new(registry, AuthGate::disabled());

    let params: Value = [("msg", "hello")].into_iter().collect();
    let mut request = Request::new("echo").with_params(params.clone()).with_id(1);
    dispatcher.dispatch(&mut request);

    assert_eq!(request.final_reply(), params);
    assert_eq!(request.id(), Some(&Value::Int(1)));
    assert_eq!(dispatcher.registry().deinit_all(), 0);
}
