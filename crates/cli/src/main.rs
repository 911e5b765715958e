// CLI modules
mod cli;

use clap::{Parser, Subcommand};
use cli::{args::Args, op::Op, Cat, Gc, Init, Ls, Put, Version};

command_enum! {
    (Cat, Cat),
    (Gc, Gc),
    (Init, Init),
    (Ls, Ls),
    (Put, Put),
    (Version, Version),
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    cli::logging::init_logging(args.log_level);

    let ctx = match cli::op::OpContext::new(args.config) {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    match args.command.execute(&ctx).await {
        Ok(output) => {
            let output = output.to_string();
            if !output.is_empty() {
                println!("{}", output);
            }
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
