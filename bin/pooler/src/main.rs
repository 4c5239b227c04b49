use anyhow::Result;
use clap::Parser;

mod cli;

fn main() {
    let cli = match cli::Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // configuration errors always exit 1, help/version exit 0
            if err.use_stderr() {
                let _ = err.print();
                std::process::exit(1);
            }
            let _ = err.print();
            std::process::exit(0);
        }
    };

    if let Err(err) = run(cli) {
        eprintln!("\x1b[31merror:\x1b[0m {err:?}");
        std::process::exit(1);
    }
}

fn run(cli: cli::Cli) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;

    runtime.block_on(async {
        pooler_node::logger::init()?;
        let node = pooler_node::Node::launch(cli.into_config()).await?;
        node.run_until_shutdown().await
    })
}
