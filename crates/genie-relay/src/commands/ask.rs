use anyhow::{Context, Result};

/// Ask one question and print the reply pages (or the JSON outcome).
pub async fn run(question: &str, config_path: &str, user_id: &str, json: bool) -> Result<()> {
    let service = super::build_service(config_path).await?;

    if json {
        let outcome = service.run_prompt(user_id, question).await;
        let rendered =
            serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
        println!("{rendered}");
        return Ok(());
    }

    let pages = service.handle_question(user_id, question).await;
    println!("{}", pages.join("\n\n---\n\n"));
    Ok(())
}
