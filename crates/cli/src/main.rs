mod logging;

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use ds_core::llm::{ChatDelta, ChatOpts, Message, ModelClient};
use futures::StreamExt;
use providers::deepseek_web::{DeepSeekWebConfig, DeepSeekWebProvider, TokenCache};
use tokio::io::AsyncReadExt;
use tracing::{error, info};

/// One-shot chat against the DeepSeek web endpoint.
#[derive(Parser, Debug)]
#[command(name = "dsweb", version)]
struct Args {
    /// Print deltas as they arrive.
    #[arg(long, short)]
    stream: bool,
    /// List the known models and exit.
    #[arg(long = "models")]
    list_models: bool,
    /// Mirror logs to stderr.
    #[arg(long, short)]
    verbose: bool,
    /// Model id; defaults to the configured one.
    #[arg(long, short)]
    model: Option<String>,
    /// System message sent before the prompt.
    #[arg(long)]
    system: Option<String>,
    /// Prompt words; read from stdin when empty.
    #[arg(trailing_var_arg = true)]
    prompt: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = logging::init(args.verbose)?;

    let cfg = DeepSeekWebConfig::from_env_and_file()?;
    let provider = DeepSeekWebProvider::new(&cfg, Arc::new(TokenCache::new()))?;

    if args.list_models {
        for m in provider.list_models() {
            println!("{}\t{}", m.id, m.display_name);
        }
        return Ok(());
    }

    let mut prompt = args.prompt.join(" ");
    if prompt.trim().is_empty() {
        tokio::io::stdin().read_to_string(&mut prompt).await?;
    }
    if prompt.trim().is_empty() {
        bail!("empty prompt: pass it as arguments or on stdin");
    }

    let mut msgs = Vec::new();
    if let Some(s) = args.system {
        msgs.push(Message::system(s));
    }
    msgs.push(Message::user(prompt));
    let opts = ChatOpts {
        model: args.model.unwrap_or(cfg.model.clone()),
    };
    info!(target: "dsweb", "submit: model={} stream={} messages={}", opts.model, args.stream, msgs.len());

    if !args.stream {
        let res = provider.send_chat(&msgs, &opts).await?;
        if !res.reasoning.is_empty() {
            eprintln!("{}", res.reasoning);
        }
        println!("{}", res.text);
        return Ok(());
    }

    let mut s = provider.stream_chat(msgs, opts).await?;
    let mut out = std::io::stdout();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!(target: "dsweb", "canceled by user");
                break;
            }
            it = s.next() => match it {
                Some(Ok(ChatDelta::Text(t))) => {
                    out.write_all(t.as_bytes())?;
                    out.flush()?;
                }
                Some(Ok(ChatDelta::Reasoning(t))) => eprint!("{t}"),
                Some(Ok(ChatDelta::Finish(_))) | None => break,
                Some(Err(e)) => {
                    error!(target: "dsweb", "stream delta error: {}", e);
                    println!();
                    return Err(e.into());
                }
            }
        }
    }
    println!();
    Ok(())
}
