use clap::Parser;

use kmax::config::{Cli, Settings};
use kmax::system;
use kmax::Driver;

fn main() {
    let cli = Cli::parse();
    system::set_level(Settings::log_level(&cli));

    let result = run(&cli);
    if let Err(e) = result {
        e.print();
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), kmax::Error> {
    let settings = Settings::resolve(cli)?;
    let driver = Driver::new(settings);
    let results = driver.run()?;

    eprintln!(
        "found {} compilation unit(s), {} library unit(s), {} host program(s)",
        results.compilation_units.len(),
        results.library_units.len(),
        results.hostprog_units.len(),
    );
    for unit in &results.compilation_units {
        let cond = results
            .presence_conditions
            .get(unit)
            .map(|c| c.to_string())
            .unwrap_or_else(|| "True".to_string());
        println!("{unit}\t{cond}");
    }

    Ok(())
}
