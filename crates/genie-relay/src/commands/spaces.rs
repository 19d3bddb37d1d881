use anyhow::Result;

pub async fn run(config_path: &str) -> Result<()> {
    let service = super::build_service(config_path).await?;
    println!("{}", service.list_spaces_markdown().await);
    Ok(())
}
