use crate::output;
use anyhow::Result;
use opskit_core::doctor;

pub fn run(strict: bool, json: bool) -> Result<()> {
    let probes = doctor::probe_all();

    if json {
        output::print_json(&probes)?;
    } else {
        let rows = probes
            .iter()
            .map(|p| {
                vec![
                    p.binary.clone(),
                    p.subsystem.clone(),
                    match &p.path {
                        Some(path) => path.display().to_string(),
                        None => "missing".to_string(),
                    },
                ]
            })
            .collect();
        output::print_table(&["BINARY", "USED BY", "RESOLVED"], rows);

        let found = probes.iter().filter(|p| p.found()).count();
        println!("\n{found}/{} binaries found.", probes.len());
    }

    let missing = doctor::missing_core(&probes);
    if strict && !missing.is_empty() {
        anyhow::bail!("claude not found on PATH; workflow commands cannot run");
    }
    Ok(())
}
