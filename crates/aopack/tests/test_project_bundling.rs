#![allow(clippy::disallowed_methods)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use aopack::{
    bundler::RecordKind,
    config::Config,
    orchestrator::{BundleOrchestrator, BundleResult},
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn import_names(result: &BundleResult) -> Vec<String> {
    result
        .project
        .modules
        .iter()
        .map(|module| module.import_path.clone())
        .collect()
}

#[test]
fn test_end_to_end_single_dependency() {
    let temp = TempDir::new().unwrap();
    let entry = write(
        temp.path(),
        "main.lua",
        "local util = require(\"util\")\nprint(util.greet())",
    );
    write(
        temp.path(),
        "util.lua",
        "local M = {}\nfunction M.greet()\nreturn 'hi'\nend\nreturn M",
    );

    let result = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap();

    assert_eq!(import_names(&result), ["util", "main"]);
    insta::assert_snapshot!(result.bundle.source.as_str(), @r#"
    -- module: "util"
    local function _loaded_mod_util()
    local M = {}
    function M.greet()
    return 'hi'
    end
    return M
    end

    _G.package.loaded["util"] = _loaded_mod_util()

    local util = require("util")
    print(util.greet())
    "#);
}

#[test]
fn test_nested_project_orders_dependencies_first() {
    let temp = TempDir::new().unwrap();
    let entry = write(
        temp.path(),
        "process.lua",
        "local handlers = require('handlers.init')\nlocal json = require('json')\nhandlers.register()",
    );
    write(
        temp.path(),
        "handlers/init.lua",
        "local db = require('lib.db')\nlocal log = require('lib.log')\nreturn { register = function() end }",
    );
    write(temp.path(), "lib/db.lua", "local log = require('lib.log')\nreturn {}");
    write(temp.path(), "lib/log.lua", "return print");

    let result = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap();

    assert_eq!(
        import_names(&result),
        ["lib.log", "lib.db", "handlers.init", "process"]
    );
    assert_eq!(result.project.skipped, ["json"]);

    let order: Vec<PathBuf> = result
        .project
        .modules
        .iter()
        .map(|module| module.resolved_path.clone())
        .collect();
    let graph = result.project.dependency_graph();
    assert_eq!(graph.edge_count(), 4);
    assert!(graph.ordering_violations(&order).is_empty());

    let source = &result.bundle.source;
    let log_at = source.find("_loaded_mod_lib_log()").unwrap();
    let db_at = source.find("_loaded_mod_lib_db()").unwrap();
    let handlers_at = source.find("_loaded_mod_handlers_init()").unwrap();
    assert!(log_at < db_at && db_at < handlers_at);
    assert!(!source.contains("_loaded_mod_json"));
    assert!(source.ends_with("handlers.register()"));
}

#[test]
fn test_comment_excluded_and_missing_modules_skipped() {
    let temp = TempDir::new().unwrap();
    let entry = write(
        temp.path(),
        "main.lua",
        "-- require(\"x\")\nrequire(\"y\")\nrequire(\"ghost\")",
    );
    write(temp.path(), "x.lua", "error('must not be bundled')");
    write(temp.path(), "y.lua", "return 'y'");

    let result = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap();

    assert_eq!(import_names(&result), ["y", "main"]);
    assert_eq!(result.project.skipped, ["ghost"]);
    assert!(!result.bundle.source.contains("must not be bundled"));
}

#[test]
fn test_aliases_bundle_one_wrapper_and_two_registrations() {
    let temp = TempDir::new().unwrap();
    let entry = write(
        temp.path(),
        "main.lua",
        "local a = require('lib.strings')\nlocal b = require('lib/strings')\nassert(a == b)",
    );
    write(temp.path(), "lib/strings.lua", "return { upper = string.upper }");

    let result = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap();
    let source = &result.bundle.source;

    assert_eq!(result.project.len(), 2);
    assert_eq!(source.matches("local function _loaded_mod_lib_strings()").count(), 1);
    assert!(source.contains("_G.package.loaded[\"lib.strings\"] = _loaded_mod_lib_strings()"));
    assert!(source.contains(
        "_G.package.loaded[\"lib/strings\"] = _G.package.loaded[\"lib.strings\"]"
    ));

    let kinds: Vec<(String, RecordKind)> = result
        .bundle
        .modules
        .iter()
        .map(|record| (record.import_path.clone(), record.kind))
        .collect();
    assert_eq!(
        kinds,
        [
            ("lib.strings".to_owned(), RecordKind::Wrapped),
            ("lib/strings".to_owned(), RecordKind::Alias),
            ("main".to_owned(), RecordKind::Entry),
        ]
    );
}

#[test]
fn test_module_below_a_plain_file_is_skipped() {
    let temp = TempDir::new().unwrap();
    let entry = write(
        temp.path(),
        "main.lua",
        "local helpers = require('util.helpers')\nprint(helpers)",
    );
    write(temp.path(), "util", "not a directory");

    let result = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap();

    assert_eq!(import_names(&result), ["main"]);
    assert_eq!(result.project.skipped, ["util.helpers"]);
    assert_eq!(
        result.bundle.source,
        "local helpers = require('util.helpers')\nprint(helpers)"
    );
}

#[cfg(unix)]
#[test]
fn test_escaped_import_name_resolves_and_is_requoted() {
    let temp = TempDir::new().unwrap();
    let entry = write(temp.path(), "main.lua", "local m = require(\"it\\\\\")");
    write(temp.path(), "it\\.lua", "return 'backslash'");

    let result = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap();

    assert_eq!(import_names(&result), ["it\\", "main"]);
    assert!(
        result
            .bundle
            .source
            .contains("_G.package.loaded[\"it\\\\\"] = _loaded_mod_it_()")
    );
}

#[test]
fn test_cycle_terminates_and_is_reported() {
    let temp = TempDir::new().unwrap();
    let entry = write(temp.path(), "main.lua", "require('a')");
    write(temp.path(), "a.lua", "require('b')\nreturn 'a'");
    write(temp.path(), "b.lua", "require('a')\nreturn 'b'");

    let result = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap();

    assert_eq!(import_names(&result), ["b", "a", "main"]);
    assert_eq!(result.project.cycles.len(), 1);
    assert_eq!(result.bundle.source.matches("local function").count(), 2);

    let strict = Config {
        strict_cycles: true,
        ..Config::default()
    };
    let err = BundleOrchestrator::new(strict).bundle(&entry).unwrap_err();
    assert!(format!("{err:#}").contains("Circular require detected"));
}

#[test]
fn test_missing_entry_is_fatal() {
    let temp = TempDir::new().unwrap();
    let entry = temp.path().join("main.lua");

    let err = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap_err();
    assert!(format!("{err:#}").contains(&format!("Entry file not found: {}", entry.display())));
}

#[test]
fn test_unreadable_module_is_fatal_not_skipped() {
    let temp = TempDir::new().unwrap();
    let entry = write(temp.path(), "main.lua", "require('blob')");
    let blob = temp.path().join("blob.lua");
    fs::write(&blob, [0xff, 0xfe, 0x00, 0x80]).unwrap();

    let err = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap_err();
    assert!(format!("{err:#}").contains(&format!("Failed to read {}", blob.display())));
}

#[cfg(unix)]
#[test]
fn test_permission_denied_is_fatal() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    let entry = write(temp.path(), "main.lua", "require('secret')");
    let secret = write(temp.path(), "secret.lua", "return 1");
    fs::set_permissions(&secret, fs::Permissions::from_mode(0o000)).unwrap();

    // Privileged users can read the file anyway
    if fs::read_to_string(&secret).is_ok() {
        return;
    }

    let err = BundleOrchestrator::new(Config::default())
        .bundle(&entry)
        .unwrap_err();
    assert!(format!("{err:#}").contains(&format!("Failed to read {}", secret.display())));
}

#[test]
fn test_project_config_changes_bundle_shape() {
    let temp = TempDir::new().unwrap();
    let entry = write(temp.path(), "main.lua", "require('util')");
    write(temp.path(), "util.lua", "return 1");
    write(
        temp.path(),
        "aopack.toml",
        "[bundle]\ncache_table = \"package.loaded\"\nmodule_headers = false\n",
    );

    let config = Config::load_with_user_config(None, None, Some(temp.path())).unwrap();
    let result = BundleOrchestrator::new(config).bundle(&entry).unwrap();

    assert_eq!(
        result.bundle.source,
        "local function _loaded_mod_util()\nreturn 1\nend\n\n\
         package.loaded[\"util\"] = _loaded_mod_util()\n\nrequire('util')"
    );
}
