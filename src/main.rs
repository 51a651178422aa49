use clap::Parser;
use ppe_monitor::cli::{
    handle_completions, handle_config_init, history, run, Cli, Commands, ConfigCommands,
    HistoryCommands,
};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run(args) => run::run_monitor(args).await,
        Commands::History(cmd) => {
            let output = match cmd {
                HistoryCommands::List(args) => history::handle_history_list(&args),
                HistoryCommands::Clear(args) => history::handle_history_clear(&args),
            };
            output.map(|text| println!("{}", text))
        }
        Commands::Config(config_cmd) => match config_cmd {
            ConfigCommands::Init(args) => handle_config_init(&args),
        },
        Commands::Completions(args) => {
            handle_completions(&args);
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
