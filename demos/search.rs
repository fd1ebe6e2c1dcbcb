use github_explorer::{GithubClient, GithubSettings, RepoParams, SearchParams, SortOrder, UserSort};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let query = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "torvalds".to_owned());

    let settings = GithubSettings::from_env()?;
    let client = GithubClient::from_settings(&settings)?;

    let rate = client.get_rate_limit().await?;
    println!(
        "rate limit: {}/{} ({:?}), resets at {}",
        rate.remaining,
        rate.limit,
        rate.status(),
        rate.reset_at()
            .map(|at| at.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_owned())
    );

    let found = match client
        .search_users(
            &SearchParams::new(&query)
                .sort(UserSort::Followers, SortOrder::Desc)
                .per_page(5),
        )
        .await
    {
        Ok(found) => found,
        Err(err) => {
            eprintln!("{}", err.user_message());
            return Err(err.into());
        }
    };
    println!("{} users match '{query}'", found.total_count);

    let Some(top) = found.items.first() else {
        return Ok(());
    };
    for repository in client
        .get_user_repositories(&RepoParams::new(&top.login).per_page(5))
        .await?
    {
        println!(
            "{:<40} {:>8} stars  {}",
            repository.full_name,
            repository.stargazers_count,
            repository.language.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
