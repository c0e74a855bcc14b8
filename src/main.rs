//! Dreamweaver CLI：根据孩子的信息生成一篇睡前故事
//!
//! 进度逐行输出到 stdout，最终故事以 Markdown 输出；日志走 stderr。Ctrl-C 取消运行。

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use dreamweaver::agents::AgentClients;
use dreamweaver::config::load_config;
use dreamweaver::model::{StoryLength, StoryRequest};
use dreamweaver::observability;
use dreamweaver::{Pipeline, PipelineEvent, TerminalResult};
use futures_util::StreamExt;

#[derive(Parser)]
#[command(name = "dreamweaver")]
#[command(about = "Dreamweaver - personalized bedtime stories", long_about = None)]
struct Cli {
    /// The child's name (the hero of the story)
    #[arg(short, long)]
    name: String,

    /// The child's age
    #[arg(short, long, default_value_t = 5, value_parser = clap::value_parser!(u8).range(2..=10))]
    age: u8,

    /// Story length
    #[arg(short, long, value_enum, default_value_t = LengthArg::Medium)]
    length: LengthArg,

    /// Interests (repeat for several)
    #[arg(short, long = "interest", required = true)]
    interests: Vec<String>,

    /// A special character to include (pet, toy, imaginary friend)
    #[arg(long)]
    character: Option<String>,

    /// Moral lesson woven into the story
    #[arg(short, long, default_value = "Kindness")]
    moral: String,

    /// Topics the story must avoid
    #[arg(long)]
    avoid: Option<String>,

    /// Do not include a fun fact
    #[arg(long)]
    no_fun_fact: bool,

    /// Story language
    #[arg(long, default_value = "English")]
    language: String,

    /// Extra config file (layered over config/default.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print every event as a JSON line instead of text
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum LengthArg {
    Short,
    Medium,
    Long,
}

impl From<LengthArg> for StoryLength {
    fn from(arg: LengthArg) -> Self {
        match arg {
            LengthArg::Short => StoryLength::Short,
            LengthArg::Medium => StoryLength::Medium,
            LengthArg::Long => StoryLength::Long,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    observability::init();

    let cfg = load_config(cli.config.clone()).context("Failed to load config")?;
    let request = StoryRequest {
        child_name: cli.name,
        age: cli.age,
        story_length: cli.length.into(),
        interests: cli.interests,
        special_character: cli.character,
        moral_lesson: cli.moral,
        topics_to_avoid: cli.avoid,
        include_fun_fact: !cli.no_fun_fact,
        story_language: cli.language,
    }
    .into_run_request()
    .context("Invalid story request")?;

    let clients = AgentClients::from_config(&cfg.llm).context("Failed to create LLM clients")?;
    let pipeline =
        Pipeline::with_agents(clients.clone(), &cfg).context("Failed to build pipeline")?;
    let mut stream = pipeline.run(request);

    let mut outcome = None;
    loop {
        tokio::select! {
            event = stream.next() => {
                let Some(event) = event else { break };
                if cli.json {
                    println!("{}", serde_json::to_string(&event)?);
                }
                match event {
                    PipelineEvent::Progress(p) if !cli.json => println!("* {}", p.kind),
                    PipelineEvent::Progress(_) => {}
                    PipelineEvent::Terminal(result) => outcome = Some(result),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("Cancelling...");
                stream.cancel();
            }
        }
    }

    let (prompt_tokens, completion_tokens, total_tokens) = clients.token_usage();
    tracing::info!(prompt_tokens, completion_tokens, total_tokens, "token usage");

    match outcome {
        Some(TerminalResult::Success { draft, attempts, .. }) => {
            if !cli.json {
                println!("\n{}", draft.to_markdown());
                tracing::info!(attempts, "story delivered");
            }
            Ok(())
        }
        Some(TerminalResult::Failed {
            reason,
            attempts,
            last_issues,
        }) => {
            if !cli.json {
                for issue in &last_issues {
                    eprintln!("  - {issue}");
                }
            }
            anyhow::bail!("story generation failed after {attempts} revision(s): {reason:?}")
        }
        None => anyhow::bail!("pipeline ended without a result"),
    }
}
