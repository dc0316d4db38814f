//! Shared fixtures for `retroshade-pipeline` integration tests.
#![allow(dead_code)]

use std::time::Duration;

use retroshade_emu::test_utils::ScriptedLoader;
use retroshade_emu::FakeClock;
use retroshade_pipeline::{Pipeline, PipelineConfig, ResolverChain};
use retroshade_registry::{CompilerDescriptor, DriverDescriptor, MachineVariant, Registry};

pub const VENDOR_CC: &str = "compilers/vendor/cc.dll";
pub const ALT_CC: &str = "compilers/alt.dll";
pub const VENDOR_DRIVER: &str = "drivers/drv.so";
pub const OTHER_DRIVER: &str = "drivers/other.so";

/// Each scripted `step` call costs this much fake wall-clock time, so a default 16 ms budget
/// fits four quanta per frame.
pub const STEP_COST: Duration = Duration::from_millis(5);

pub fn registry() -> Registry {
    Registry {
        compilers: vec![
            CompilerDescriptor {
                name: "Vendor CC".into(),
                path: "vendor/cc.dll".into(),
            },
            CompilerDescriptor {
                name: "Alt CC".into(),
                path: "alt.dll".into(),
            },
        ],
        drivers: vec![
            DriverDescriptor {
                fields: vec!["Vendor Driver".into(), "drv.so".into()],
                machines: vec![
                    MachineVariant::new(["Model 1", "-gen1"]),
                    MachineVariant::new(["Model 2", "-gen2"]),
                ],
            },
            DriverDescriptor {
                fields: vec!["Other Driver".into(), "other.so".into()],
                machines: vec![MachineVariant::new(["Other 1"])],
            },
        ],
    }
}

pub struct Harness {
    pub pipeline: Pipeline,
    pub loader: ScriptedLoader,
    pub clock: FakeClock,
}

pub fn harness(resolvers: ResolverChain) -> Harness {
    harness_with_config(PipelineConfig::default(), resolvers)
}

pub fn harness_with_config(config: PipelineConfig, resolvers: ResolverChain) -> Harness {
    let clock = FakeClock::new();
    let loader = ScriptedLoader::new().with_clock(clock.clone());
    let pipeline = Pipeline::new(
        config,
        registry(),
        Box::new(loader.clone()),
        Box::new(clock.clone()),
        resolvers,
    )
    .expect("default config is valid");
    Harness {
        pipeline,
        loader,
        clock,
    }
}
