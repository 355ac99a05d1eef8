//! Behaviour-driven tests for dispatching to real shell scripts.

use camino::Utf8PathBuf;
use indexmap::IndexMap;
use rpcd_config::{DirectorySpec, ServiceManifest, ServiceSpec};
use rpcd_types::{Map, Value};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use tempfile::TempDir;

use super::support::{module_dir, script};
use crate::auth::AuthGate;
use crate::dispatch::Dispatcher;
use crate::registry::{ModuleLoader, Registry};
use crate::request::Request;
use crate::shell::ShellSettings;

// ---------------------------------------------------------------------------
// Test world
// ---------------------------------------------------------------------------

struct TestWorld {
    _dir: TempDir,
    path: Utf8PathBuf,
    modules: IndexMap<String, Map>,
    request: Option<Request>,
}

#[fixture]
fn world() -> TestWorld {
    let (dir, path) = module_dir();
    TestWorld {
        _dir: dir,
        path,
        modules: IndexMap::new(),
        request: None,
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn dispatcher(world: &TestWorld) -> Dispatcher {
    let mut directory = DirectorySpec::new(world.path.clone());
    directory.modules = world.modules.clone();
    let mut manifest = ServiceManifest::default();
    manifest.services.insert(
        String::from("main"),
        ServiceSpec {
            default_directory: None,
            config: Map::new(),
            directories: IndexMap::from([(String::from("scripts"), directory)]),
        },
    );
    let loader = ModuleLoader::with_settings(ShellSettings::new().inherit_path());
    let registry = Registry::from_manifest(&manifest, &loader).expect("registry");
    registry.init_all().expect("init");
    Dispatcher::new(registry, AuthGate::disabled())
}

fn dispatch(world: &mut TestWorld, mut request: Request) {
    dispatcher(world).dispatch(&mut request);
    world.request = Some(request);
}

fn reply(world: &TestWorld) -> &Value {
    world
        .request
        .as_ref()
        .and_then(Request::reply)
        .expect("no reply captured")
}

// ---------------------------------------------------------------------------
// Given steps
// ---------------------------------------------------------------------------

#[given("a module directory with a script {name} printing {output}")]
fn given_printing_script(world: &mut TestWorld, name: String, output: String) {
    let stem = name.trim_matches('"');
    let text = output.trim_matches('"');
    script(&world.path, &format!("{stem}.sh"), &format!("echo \"{text}\""));
}

#[given("a module directory with a script {name} exiting with status {status}")]
fn given_failing_script(world: &mut TestWorld, name: String, status: i32) {
    let stem = name.trim_matches('"');
    script(
        &world.path,
        &format!("{stem}.sh"),
        &format!("echo failed\necho \"{stem} is broken\" >&2\nexit {status}"),
    );
}

#[given("module {name} requires parameter {parameter}")]
fn given_required_parameter(world: &mut TestWorld, name: String, parameter: String) {
    let rule: Map = [
        (String::from("name"), Value::from(parameter.trim_matches('"'))),
        (String::from("required"), Value::Bool(true)),
    ]
    .into_iter()
    .collect();
    let fragment: Map = [(String::from("firewall"), Value::List(vec![Value::Map(rule)]))]
        .into_iter()
        .collect();
    world
        .modules
        .insert(name.trim_matches('"').to_owned(), fragment);
}

// ---------------------------------------------------------------------------
// When steps
// ---------------------------------------------------------------------------

#[when("method {method} is dispatched")]
fn when_dispatched(world: &mut TestWorld, method: String) {
    dispatch(world, Request::new(method.trim_matches('"')));
}

#[when("method {method} is dispatched with parameter {name} set to {value}")]
fn when_dispatched_with(world: &mut TestWorld, method: String, name: String, value: String) {
    let params: Value = [(name.trim_matches('"'), value.trim_matches('"'))]
        .into_iter()
        .collect();
    dispatch(world, Request::new(method.trim_matches('"')).with_params(params));
}

// ---------------------------------------------------------------------------
// Then steps
// ---------------------------------------------------------------------------

#[then("the reply field {field} is {expected}")]
fn then_reply_field(world: &mut TestWorld, field: String, expected: String) {
    let reply = reply(world);
    assert_eq!(
        reply.get(field.trim_matches('"')),
        Some(&Value::from(expected.trim_matches('"'))),
        "unexpected reply: {reply:?}"
    );
}

#[then("the reply is an error with code {code}")]
fn then_error_code(world: &mut TestWorld, code: i64) {
    let reply = reply(world);
    let error = reply.as_error().expect("expected an error reply");
    assert_eq!(error.code(), code, "unexpected error: {error:?}");
}

// ---------------------------------------------------------------------------
// Scenario registration
// ---------------------------------------------------------------------------

#[scenario(path = "tests/features/shell_dispatch.feature")]
fn shell_dispatch_behaviour(world: TestWorld) {
    let _ = world;
}
