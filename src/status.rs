use anyhow::Result;

use chat_harness::config::{non_empty_env, Config};

/// Effective settings followed by the environment variables they rely on.
pub fn render_status(config: &Config) -> String {
    let mut out = String::new();

    out.push_str(&format!("{:<12} {}\n", "SETTING", "VALUE"));
    out.push_str(&format!(
        "{:<12} size={} overlap={}\n",
        "chunking", config.chunking.chunk_size, config.chunking.chunk_overlap
    ));
    out.push_str(&format!("{:<12} top_k={}\n", "retrieval", config.retrieval.top_k));
    out.push_str(&format!(
        "{:<12} {} ({})\n",
        "embedding",
        config.embedding.provider,
        config.embedding.model.as_deref().unwrap_or("default model")
    ));
    out.push_str(&format!(
        "{:<12} {} {} (temperature {})\n",
        "llm", config.llm.provider, config.llm.model, config.llm.temperature
    ));
    out.push_str(&format!(
        "{:<12} {}\n",
        "container",
        config
            .storage
            .container_name()
            .unwrap_or_else(|| "NOT CONFIGURED".to_string())
    ));

    let mut vars = vec![
        (config.storage.connection_string_env.as_str(), "storage"),
        (config.storage.container_env.as_str(), "storage"),
        (config.llm.api_key_env.as_str(), "llm"),
    ];
    if config.embedding.provider == "openai" {
        vars.push((config.embedding.api_key_env.as_str(), "embedding"));
    }

    out.push('\n');
    out.push_str(&format!("{:<24} {:<10} USED BY\n", "ENV VAR", "STATUS"));
    for (name, used_by) in vars {
        let status = if non_empty_env(name).is_some() {
            "SET"
        } else {
            "MISSING"
        };
        out.push_str(&format!("{:<24} {:<10} {}\n", name, status, used_by));
    }
    out
}

pub fn run_status(config: &Config) -> Result<()> {
    print!("{}", render_status(config));
    Ok(())
}
