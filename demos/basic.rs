use netservice_http::{
    CallOptions, CallOutcome, HttpService, NetworkConfig, Processor, RequestDescriptor,
    RequestKind, RouteRegistry,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Serialize)]
struct ProfileQuery {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct Profile {
    name: String,
    level: u32,
}

struct FetchProfile;

impl RequestKind for FetchProfile {
    type Payload = ProfileQuery;
    type Output = Profile;
}

struct PrintProfile;

impl Processor<FetchProfile> for PrintProfile {
    fn process(&mut self, profile: &Profile) {
        println!("{} is level {}", profile.name, profile.level);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = NetworkConfig::from_env()?;
    let token = std::env::var("NETSERVICE_TOKEN").unwrap_or_default();

    let routes = RouteRegistry::builder()
        .route::<FetchProfile, _, _>(RequestDescriptor::get("/profile"), || PrintProfile)
        .build()?;
    let http = HttpService::new(config, routes);

    match http
        .send_with::<FetchProfile>(&ProfileQuery { id: 1 }, &CallOptions::new().bearer(token))
        .await?
    {
        CallOutcome::Success(_) => {}
        CallOutcome::ServerError(failure) => {
            eprintln!("server answered {}: {}", failure.status, failure.body);
        }
    }

    Ok(())
}
