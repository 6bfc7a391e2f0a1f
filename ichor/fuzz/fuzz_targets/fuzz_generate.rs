//! Fuzz target for whole-driver generation.
//!
//! Arbitrary seeds and generation settings must never panic the driver, and
//! every fragment it logs must render.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use ichor::{Driver, FuzzConfig, Grammar, ModuleRegistry};

#[derive(Debug, Arbitrary)]
struct Settings {
    seed: u64,
    budget: u8,
    chaos_rate: u16,
    subgeneration_depth: u8,
    max_statements: u8,
    turns: u8,
    max_active_modules: u8,
}

fuzz_target!(|settings: Settings| {
    let config = FuzzConfig::builder()
        .seed(settings.seed)
        .budget(u32::from(settings.budget % 12))
        .chaos_rate(u32::from(settings.chaos_rate))
        .max_subgeneration_depth(u32::from(settings.subgeneration_depth % 4))
        .max_statements(u32::from(settings.max_statements % 6) + 1)
        .turns(u32::from(settings.turns % 16) + 1)
        .max_active_modules(u32::from(settings.max_active_modules % 6) + 1)
        .build();
    let Ok(config) = config else {
        return;
    };
    let Ok(modules) = ModuleRegistry::standard(&config) else {
        return;
    };
    let Ok(mut driver) = Driver::new(config, Grammar::standard(), modules) else {
        return;
    };

    let summary = driver.run();
    assert_eq!(summary.fragments as usize, driver.entries().len());
    for fragment in driver.fragments() {
        let _ = fragment.text();
    }
    let _ = driver.testcase();
});
