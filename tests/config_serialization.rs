use selection_bubble::config::parse_config;
use selection_bubble::enhance::EnhancementStyle;
use selection_bubble::machine::MachineSettings;
use selection_bubble::Config;
use std::time::Duration;

#[test]
fn default_config_round_trips() {
    let config = Config::default();
    let json = serde_json::to_string_pretty(&config).expect("serialize config");
    let decoded: Config = serde_json::from_str(&json).expect("deserialize config");
    assert_eq!(decoded, config);
}

#[test]
fn default_config_uses_documented_constants() {
    let json = serde_json::to_value(Config::default()).expect("serialize config");
    assert_eq!(json["monitoring_enabled"], true);
    assert_eq!(json["selection"]["debounce_ms"], 500);
    assert_eq!(json["selection"]["min_trimmed_chars"], 2);
    assert_eq!(json["selection"]["clipboard_fallback"], false);
    assert_eq!(json["selection"]["clipboard_fallback_max_chars"], 1000);
    assert_eq!(json["bubble"]["initial_x"], 100);
    assert_eq!(json["bubble"]["initial_y"], 200);
    assert_eq!(json["bubble"]["drag_threshold_px"], 10);
    assert_eq!(json["enhancement"]["request_timeout_secs"], 30);
    assert_eq!(json["enhancement"]["default_style"], "general");
}

#[test]
fn partial_jsonc_keeps_other_defaults() {
    let config = parse_config(
        r#"{
            /* monitoring stays on */
            "bubble": { "initial_x": 40 },
            "enhancement": { "default_style": "detailed", },
        }"#,
    )
    .expect("parse config");
    assert_eq!(config.bubble.initial_x, 40);
    assert_eq!(config.bubble.initial_y, 200);
    assert_eq!(config.enhancement.default_style, EnhancementStyle::Detailed);
    assert_eq!(config.enhancement.request_timeout(), Duration::from_secs(30));
}

#[test]
fn unknown_style_is_rejected() {
    assert!(parse_config(r#"{"enhancement":{"default_style":"poetic"}}"#).is_err());
}

#[test]
fn machine_settings_follow_config() {
    let mut config = Config::default();
    config.monitoring_enabled = false;
    config.selection.debounce_ms = 300;
    config.bubble.drag_threshold_px = 15;

    let settings = MachineSettings::from_config(&config);
    assert!(!settings.monitoring_enabled);
    assert_eq!(settings.debounce, Duration::from_millis(300));
    assert_eq!(settings.drag_threshold, 15.0);
    assert_eq!(settings.rules.min_trimmed_chars, 2);
    assert_eq!(settings.initial_position.x, 100);
}
