//! Runs the agent over the target classes of a jar without starting a JVM.
//!
//! ```text
//! jar_dry_run app.jar a b id=c,repeat=8
//! ```
//!
//! Every argument after the jar is the option string of one install, applied
//! in order, so the output shows the marker string the class would carry once
//! all of them have transformed it. Installs with different layouts stamp
//! different marker strings; each one is decoded with its own layout and
//! labelled with the identities that share it.

use std::env;
use std::fs::File;
use std::io::Read;

use zip::ZipArchive;

use jvmti_watermark::config::AgentConfig;
use jvmti_watermark::console::Console;
use jvmti_watermark::marker::MarkerLayout;
use jvmti_watermark::source::{ClassFileLoad, HeapSource};
use jvmti_watermark::WatermarkAgent;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = env_logger::try_init();

    let mut args = env::args().skip(1);
    let jar_path = args.next().ok_or("usage: jar_dry_run JAR_PATH [AGENT_OPTIONS...]")?;
    let mut installs = args
        .map(|options| AgentConfig::from_options(Some(&options)))
        .collect::<Result<Vec<_>, _>>()?;
    if installs.is_empty() {
        installs.push(AgentConfig::default());
    }
    let agents: Vec<WatermarkAgent> = installs
        .into_iter()
        .map(|config| WatermarkAgent::new(config, Console::stdio()))
        .collect();
    let mut layouts: Vec<(MarkerLayout, String)> = Vec::new();
    for agent in &agents {
        let layout = &agent.config().layout;
        match layouts.iter_mut().find(|(l, _)| l == layout) {
            Some((_, ids)) => ids.push_str(&agent.identity().to_string()),
            None => layouts.push((layout.clone(), agent.identity().to_string())),
        }
    }

    let file = File::open(&jar_path)?;
    let mut zip = ZipArchive::new(file)?;
    let source = HeapSource::new();

    let mut class_files: u64 = 0;
    let mut targets: u64 = 0;
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let name = match entry.name().strip_suffix(".class") {
            Some(name) => name.to_string(),
            None => continue,
        };
        class_files += 1;
        if !agents.iter().any(|agent| agent.config().filter.is_target(&name)) {
            continue;
        }
        targets += 1;

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;

        for agent in &agents {
            let load = ClassFileLoad {
                name: Some(name.as_bytes()),
                loader: std::ptr::null_mut(),
                being_redefined: false,
                class_data: &bytes,
            };
            if let Some(rewritten) = agent.on_class_file_load(&source, &load) {
                bytes = rewritten;
            }
        }

        for (layout, ids) in &layouts {
            let label = if layouts.len() > 1 { format!("{} [{}]", name, ids) } else { name.clone() };
            match layout.pattern().find_in(&bytes) {
                Some(at) => {
                    let version = layout.version_at(&bytes, at).map_or('?', char::from);
                    let records: Vec<String> = layout
                        .records(&bytes, at)
                        .iter()
                        .map(|r| format!("{}->{} by {}", r.previous_version as char, r.new_version() as char, r.identity as char))
                        .collect();
                    println!("{}: version={} records=[{}]", label, version, records.join(", "));
                }
                None => println!("{}: no marker string", label),
            }
        }
    }

    println!("jar_path={}", jar_path);
    println!("class_files={} targets={}", class_files, targets);
    Ok(())
}
