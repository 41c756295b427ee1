//! The `tocin` compiler binary.

use clap::Parser;

fn main() {
    let cli = tocin_drv::Cli::parse();
    match tocin_drv::run(cli) {
        Ok(code) => std::process::exit(code),
        Err(error) => {
            eprintln!("error: {error:#}");
            std::process::exit(2);
        }
    }
}
