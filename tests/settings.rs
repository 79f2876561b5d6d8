use clipfeed::cache::BudgetPolicy;
use clipfeed::player::SurfaceKind;
use clipfeed::settings::{AppSettings, load_settings, save_settings};
use std::fs;

#[test]
fn settings_roundtrip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path();

    let mut s = AppSettings::default();
    s.cache.budget_policy = BudgetPolicy::Legacy;
    s.cache.max_mb = Some(300);
    s.cache.preload_kb = 512;
    s.network.download_retries = 5;
    s.player.surface = SurfaceKind::Surface;
    s.player.load_control.max_buffer_ms = 40_000;
    save_settings(data_dir, &s).expect("save_settings");

    let loaded = load_settings(data_dir);
    assert_eq!(loaded, s);
    assert!(!data_dir.join("settings.json.tmp").exists());
}

#[test]
fn settings_corrupt_file_falls_back_to_default() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data_dir = dir.path();
    fs::create_dir_all(data_dir).expect("create_dir_all");
    fs::write(data_dir.join("settings.json"), b"{not-json").expect("write");

    let loaded = load_settings(data_dir);
    assert_eq!(loaded, AppSettings::default());
}

#[test]
fn missing_file_gives_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let loaded = load_settings(&dir.path().join("nope"));
    assert_eq!(loaded.cache.budget_policy, BudgetPolicy::Capacity);
    assert_eq!(loaded.player.surface, SurfaceKind::Texture);
}

#[test]
fn save_creates_missing_data_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let nested = dir.path().join("a").join("b");
    save_settings(&nested, &AppSettings::default()).expect("save");
    assert!(nested.join("settings.json").exists());
}
