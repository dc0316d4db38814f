#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use retroshade_emu::EntryCapability;
use retroshade_pipeline::{select_capability, Controller, PipelineConfig};
use retroshade_registry::Registry;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "retroshade",
    about = "Inspect shader compiler/driver registries and the modules a shader would run through"
)]
struct Args {
    /// JSON pipeline config (defaults are used when omitted; RETROSHADE_* variables override both)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Compiler registry (`[{"name": .., "path": ..}]`)
    #[arg(long, value_name = "PATH", default_value = "compilers.json")]
    compilers: PathBuf,

    /// Driver registry (`[{"fields": [label, module, ..], "machines": [[name, ..], ..]}]`)
    #[arg(long, value_name = "PATH", default_value = "drivers.json")]
    drivers: PathBuf,

    /// Print JSON instead of text
    #[arg(long, action = clap::ArgAction::SetTrue)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the compilers, drivers and machine variants whose modules are present
    List,
    /// Show which modules a shader would be fed to, without running them
    Plan {
        /// Shader source file
        shader: PathBuf,

        #[arg(long, default_value_t = 0)]
        compiler: usize,

        #[arg(long, default_value_t = 0)]
        driver: usize,

        #[arg(long, default_value_t = 0)]
        machine: usize,
    },
}

#[derive(Debug, Serialize)]
struct Listing {
    compilers: Vec<ListedCompiler>,
    drivers: Vec<ListedDriver>,
}

#[derive(Debug, Serialize)]
struct ListedCompiler {
    name: String,
    module: PathBuf,
}

#[derive(Debug, Serialize)]
struct ListedDriver {
    label: String,
    module: PathBuf,
    machines: Vec<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct Plan {
    compiler_stage: CompilerPlan,
    machine_stage: Option<ModulePlan>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum CompilerPlan {
    Passthrough { marker: String },
    Run(ModulePlan),
    Skipped { reason: String },
}

#[derive(Debug, Serialize)]
struct ModulePlan {
    module: PathBuf,
    capability: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    machine: Vec<String>,
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_env("RETROSHADE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let registry = Registry::load(
        &args.compilers,
        &config.compiler_root,
        &args.drivers,
        &config.driver_root,
    )
    .context("failed to load registries")?;
    tracing::debug!(
        compilers = registry.compilers.len(),
        drivers = registry.drivers.len(),
        "registries loaded"
    );

    match args.command {
        Command::List => {
            let listing = list(&config, &registry);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else {
                print_listing(&listing);
            }
        }
        Command::Plan {
            shader,
            compiler,
            driver,
            machine,
        } => {
            let text = fs::read_to_string(&shader)
                .with_context(|| format!("failed to read shader {}", shader.display()))?;
            let mut controller = Controller::new(&config, registry);
            controller.set_shader_text(text);
            controller.select_compiler(compiler);
            controller.select_driver(driver);
            controller.select_machine(machine);

            let plan = plan(&config, &controller);
            if args.json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                print_plan(&plan);
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return PipelineConfig::from_env().context("invalid RETROSHADE_* environment");
    };
    let mut config = PipelineConfig::load(path)?;
    config
        .apply_env(|var| std::env::var(var).ok())
        .context("invalid RETROSHADE_* environment")?;
    Ok(config)
}

fn list(config: &PipelineConfig, registry: &Registry) -> Listing {
    Listing {
        compilers: registry
            .compilers
            .iter()
            .map(|c| ListedCompiler {
                name: c.name.clone(),
                module: config.compiler_root.join(&c.path),
            })
            .collect(),
        drivers: registry
            .drivers
            .iter()
            .map(|d| ListedDriver {
                label: d.label().to_string(),
                module: config.driver_root.join(d.module().unwrap_or_default()),
                machines: d.machines.iter().map(|m| m.fields.clone()).collect(),
            })
            .collect(),
    }
}

fn plan(config: &PipelineConfig, controller: &Controller) -> Plan {
    let text = controller.shader_text();
    let compiler_stage = if let Some(marker) = controller.passthrough_marker(text) {
        CompilerPlan::Passthrough {
            marker: marker.to_string(),
        }
    } else if text.is_empty() {
        CompilerPlan::Skipped {
            reason: "shader is empty".into(),
        }
    } else {
        match controller.selected_compiler() {
            Some(compiler) => CompilerPlan::Run(ModulePlan {
                module: config.compiler_root.join(&compiler.path),
                capability: select_capability(text).as_str(),
                machine: Vec::new(),
            }),
            None => CompilerPlan::Skipped {
                reason: "no compiler at the selected index".into(),
            },
        }
    };

    let machine_stage = match compiler_stage {
        CompilerPlan::Skipped { .. } => None,
        _ => controller.selected_driver().and_then(|driver| {
            let module = driver.module()?;
            let machine = controller.selected_machine()?;
            Some(ModulePlan {
                module: config.driver_root.join(module),
                capability: EntryCapability::DriverExecution.as_str(),
                machine: machine.fields.clone(),
            })
        }),
    };

    Plan {
        compiler_stage,
        machine_stage,
    }
}

fn print_listing(listing: &Listing) {
    println!("compilers:");
    for c in &listing.compilers {
        println!("  {} ({})", c.name, c.module.display());
    }
    println!("drivers:");
    for d in &listing.drivers {
        println!("  {} ({})", d.label, d.module.display());
        for m in &d.machines {
            println!("    {}", m.join(" "));
        }
    }
}

fn print_plan(plan: &Plan) {
    match &plan.compiler_stage {
        CompilerPlan::Passthrough { marker } => {
            println!("compiler: pass-through ({marker:?} marker)");
        }
        CompilerPlan::Run(step) => {
            println!("compiler: {} via {}", step.module.display(), step.capability);
        }
        CompilerPlan::Skipped { reason } => println!("compiler: skipped ({reason})"),
    }
    match &plan.machine_stage {
        Some(step) => println!(
            "machine: {} via {} [{}]",
            step.module.display(),
            step.capability,
            step.machine.join(" ")
        ),
        None => println!("machine: none"),
    }
}

