use anyhow::{Context, Result};
use mangafmt_app::config::Config;
use mangafmt_app::telemetry::init_tracing;
use mangafmt_app::{finish, load_system_prompt, MangaFormatAgent};
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level};

#[tokio::main]
async fn main() {
    init_tracing(Level::INFO);

    if let Err(e) = run().await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let config = Config::load().context("Failed to load configuration")?;
    let system_prompt = load_system_prompt(&config.prompt_path)?;

    info!(
        "Using model {} (download: {}, archive: {})",
        config.model_code,
        config.download_dir.display(),
        config.archive_dir.display()
    );

    let agent = MangaFormatAgent::new(&config, system_prompt)
        .await
        .context("Failed to start agent")?;

    let input = match read_prompt_line().await {
        Ok(line) => line,
        Err(e) => {
            let _ = finish(Ok(()), agent.shutdown().await);
            return Err(e);
        }
    };

    let result = agent.orchestrate(&input).await;
    let outcome = finish(result, agent.shutdown().await).context("Agent run failed")?;
    if let Some(answer) = outcome.answer {
        println!("{}", answer);
    }
    Ok(())
}

async fn read_prompt_line() -> Result<String> {
    print!("> ");
    std::io::stdout().flush()?;

    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read input")?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}
