//! Integration tests for on-disk plugin introspection.

mod common;

use common::GameFixture;
use loadorder::{EspReader, GameId, PluginName};

#[test]
fn test_ghosted_plugin_resolves_to_its_ghost_path() {
    let fixture = GameFixture::new(GameId::Skyrim);
    fixture.write_plugin("Mod.esp.ghost", false, &[]);

    let settings = fixture.settings();
    let name = PluginName::new("Mod.esp.ghost");
    assert_eq!(name.name(), "Mod.esp");

    let plugin = settings.plugin(&name);
    assert!(plugin.exists());
    assert!(plugin.is_ghosted());
    assert_eq!(plugin.resolved_path(), fixture.plugin_path("Mod.esp.ghost"));
}

#[test]
fn test_unghost_then_reads_go_through_the_plain_path() {
    let fixture = GameFixture::new(GameId::Skyrim);
    fixture.write_plugin("Mod.esp.ghost", false, &[]);

    let settings = fixture.settings();
    let name = PluginName::new("Mod.esp");
    let plugin = settings.plugin(&name);
    plugin.unghost().unwrap();

    assert!(!plugin.is_ghosted());
    assert!(plugin.exists());
    assert_eq!(plugin.resolved_path(), fixture.plugin_path("Mod.esp"));
}

#[test]
fn test_declared_masters_are_read_through_a_ghosted_file() {
    let fixture = GameFixture::new(GameId::Skyrim);
    fixture.write_plugin("Patch.esp.ghost", false, &["Skyrim.esm", "Update.esm"]);

    let settings = fixture.settings();
    let reader = EspReader::new(GameId::Skyrim);
    let name = PluginName::new("Patch.esp");
    let masters = settings.plugin(&name).masters(&reader).unwrap();

    assert_eq!(
        masters,
        vec![PluginName::new("Skyrim.esm"), PluginName::new("Update.esm")]
    );
}

#[test]
fn test_false_flag_diagnostic_compares_flag_and_extension() {
    let fixture = GameFixture::new(GameId::Skyrim);
    // Master flag set on an .esp, flag clear on an .esm.
    fixture.write_plugin("Sneaky.esp", true, &[]);
    fixture.write_plugin("Plain.esm", false, &[]);
    fixture.write_plugin("Honest.esm", true, &[]);

    let settings = fixture.settings();
    let reader = EspReader::new(GameId::Skyrim);

    let sneaky = PluginName::new("Sneaky.esp");
    assert!(settings.plugin(&sneaky).is_false_flagged(&reader).unwrap());

    let plain = PluginName::new("Plain.esm");
    assert!(settings.plugin(&plain).is_false_flagged(&reader).unwrap());

    let honest = PluginName::new("Honest.esm");
    assert!(!settings.plugin(&honest).is_false_flagged(&reader).unwrap());
}

#[test]
fn test_ordering_follows_the_flag_not_the_extension() {
    let fixture = GameFixture::new(GameId::Oblivion);
    fixture.write_plugin("Oblivion.esm", true, &[]);
    // Flagged as a master despite the .esp extension.
    fixture.write_plugin("Sneaky.esp", true, &[]);
    fixture.write_plugin("Mod.esp", false, &[]);
    fixture.set_plugin_mtime("Oblivion.esm", 100);
    fixture.set_plugin_mtime("Sneaky.esp", 300);
    fixture.set_plugin_mtime("Mod.esp", 200);

    let mut handle = fixture.handle();
    let order: Vec<String> = handle
        .load_order()
        .unwrap()
        .iter()
        .map(|name| name.name().to_string())
        .collect();

    assert_eq!(order, vec!["Oblivion.esm", "Sneaky.esp", "Mod.esp"]);
}
