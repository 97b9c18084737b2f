// webster_main.rs
//
// Standalone Webster computation: reads a WebsterInput JSON file and prints
// the resulting plan, no engine attached.
use adaptive_signal_control::config::WebsterSettings;
use adaptive_signal_control::shared_data::WebsterInput;
use adaptive_signal_control::webster::calculate_webster;
use std::env;
use std::fs;

fn main() {
    env_logger::init();

    let path = env::args()
        .nth(1)
        .expect("usage: webster_main <input.json>");
    let raw = fs::read_to_string(&path).expect("read webster input file");
    let input: WebsterInput = serde_json::from_str(&raw).expect("parse webster input");

    let output = calculate_webster(&input, &WebsterSettings::default());
    println!(
        "{}",
        serde_json::to_string_pretty(&output).expect("serialize webster output")
    );
}
