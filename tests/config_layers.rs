//! `Config::load` layering: built-in table, then a file on disk, then the environment.
//!
//! Kept to one test so the environment mutation cannot race another test in this binary.

use modelgate::{Config, TaskCategory};
use tempfile::TempDir;

const OVERRIDE_VAR: &str = "MODELGATE__ROUTER__PRIMARY_PROVIDER";

const FILE: &str = r#"
[router]
primary_provider = "mistral"
blacklist_multiplier = 2.0

[providers]
local = "LOCAL_API_KEY"

[[models]]
id = "local/tiny"
provider = "local"
task_categories = ["dialog"]
rpm_limit = 5

[[models]]
id = "groq/fast"
provider = "groq"
task_categories = ["code"]
rpm_limit = 0
"#;

#[test]
fn file_then_environment_override_builtin() {
    // SAFETY: the only test in this binary, so no other thread reads the environment.
    unsafe { std::env::remove_var(OVERRIDE_VAR) };

    let builtin = Config::load(None).unwrap();
    assert_eq!(builtin.router.primary_provider, "openrouter");
    assert_eq!(builtin.models.len(), Config::builtin().unwrap().models.len());

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("modelgate.toml");
    std::fs::write(&path, FILE).unwrap();

    let from_file = Config::load(Some(&path)).unwrap();
    assert_eq!(from_file.router.primary_provider, "mistral");
    assert_eq!(from_file.router.blacklist_multiplier, 2.0);
    let ids: Vec<_> = from_file.models.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["local/tiny", "groq/fast"]);
    // Provider mappings merge with the built-in ones.
    assert_eq!(
        from_file.providers.get("local").map(String::as_str),
        Some("LOCAL_API_KEY")
    );
    assert_eq!(
        from_file.providers.get("groq").map(String::as_str),
        Some("GROQ_API_KEY")
    );
    let registry = from_file.registry().unwrap();
    assert_eq!(registry.list_models(TaskCategory::Code)[0].id, "groq/fast");

    // SAFETY: as above.
    unsafe { std::env::set_var(OVERRIDE_VAR, "groq") };
    let overridden = Config::load(Some(&path));
    unsafe { std::env::remove_var(OVERRIDE_VAR) };

    let overridden = overridden.unwrap();
    assert_eq!(overridden.router.primary_provider, "groq");
    assert_eq!(overridden.router.blacklist_multiplier, 2.0);
    assert_eq!(overridden.models.len(), 2);

    assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
}
