//! Demo pipeline runner
//!
//! Wires a researcher → analyst → writer pipeline over whichever providers
//! have API keys configured and prints each task's outcome.
//!
//! Usage:
//!   GEMINI_API_KEY="..." \
//!   OPENAI_API_KEY="..." \
//!   ANTHROPIC_API_KEY="..." \
//!   cargo run
//!
//! At least one key is required; agents cycle over the configured providers.

use dotenv::dotenv;
use mangaba_backend::runtime::{MangabaAI, TaskSpec};
use mangaba_backend::tools::GoogleSearchTool;
use mangaba_backend::{Config, ErrorPolicy};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env();
    let mut mangaba = match MangabaAI::new(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            log::error!("[MAIN] Failed to initialize: {}", e);
            std::process::exit(1);
        }
    };

    let providers = mangaba.providers();
    if providers.is_empty() {
        log::error!(
            "[MAIN] No providers configured. Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY."
        );
        std::process::exit(1);
    }

    if !mangaba.validate_api_keys().await {
        log::error!("[MAIN] API key validation failed");
        std::process::exit(1);
    }

    // Cycle agents over whatever providers are available.
    let provider_for = |i: usize| providers[i % providers.len()];

    let researcher = match mangaba.agent_builder("researcher", provider_for(0)) {
        Ok(builder) => builder
            .role("a research specialist")
            .goal("Gather accurate, current information")
            .tool(Arc::new(
                GoogleSearchTool::new().with_trigger("(?i)research|find|investigate"),
            ))
            .error_policy(ErrorPolicy::Propagate)
            .build(),
        Err(e) => {
            log::error!("[MAIN] Failed to create researcher: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = mangaba.register_agent(researcher) {
        log::error!("[MAIN] Failed to register researcher: {}", e);
        std::process::exit(1);
    }

    let analyst = mangaba.create_agent(
        "analyst",
        "a data analyst",
        "Extract the key findings from research",
        provider_for(1),
    );
    let writer = mangaba.create_agent(
        "writer",
        "a technical writer",
        "Produce a clear, concise summary",
        provider_for(2),
    );
    if let Err(e) = analyst.and(writer) {
        log::error!("[MAIN] Failed to create agents: {}", e);
        std::process::exit(1);
    }

    let tasks = vec![
        TaskSpec::new("Research current trends in generative AI", "researcher").with_priority(2),
        TaskSpec::new("Analyze the research findings", "analyst").with_deps(&[0]),
        TaskSpec::new("Write a short summary of the analysis", "writer").with_deps(&[1]),
    ];

    match mangaba.execute(tasks).await {
        Ok(results) => {
            for (task, result) in &results {
                println!("== {}\n{}\n", task, result);
            }
        }
        Err(e) => {
            log::error!("[MAIN] Execution failed: {}", e);
            std::process::exit(1);
        }
    }

    mangaba.cleanup();
}
