//! Image build stage

use crate::discovery::EmbeddedBuild;
use crate::error::{Error, Result, summarize_output};
use crate::report::StageOutcome;
use crate::swarm::SwarmClient;
use tracing::info;

/// Image tag for a service; docker repository names must be lowercase
pub fn image_tag(service: &str) -> String {
    format!("{}:latest", service.to_lowercase())
}

/// Join a path from a compose file onto the service directory
pub(crate) fn resolve_path(service_dir: &str, relative: &str) -> String {
    if relative.starts_with('/') {
        return relative.to_string();
    }
    let relative = relative.trim_start_matches("./").trim_end_matches('/');
    if relative.is_empty() || relative == "." {
        service_dir.to_string()
    } else {
        format!("{service_dir}/{relative}")
    }
}

pub async fn build_service(
    swarm: &SwarmClient,
    service: &str,
    service_dir: &str,
    plan: Option<&EmbeddedBuild>,
) -> Result<StageOutcome> {
    let Some(plan) = plan else {
        return Ok(StageOutcome::skipped("no build descriptor"));
    };

    let tag = image_tag(service);
    let context = resolve_path(service_dir, &plan.context);
    let dockerfile = plan
        .dockerfile
        .as_deref()
        .map(|file| resolve_path(&context, file));

    info!(service, tag = %tag, context = %context, "building image");
    let output = swarm.build_image(&tag, &context, dockerfile.as_deref()).await?;
    if output.success() {
        return Ok(StageOutcome::succeeded(format!("built {tag}")));
    }

    let error = Error::Build {
        service: service.to_string(),
        exit_code: output.exit_code,
        output: summarize_output(&output.stdout, &output.stderr),
    };
    tracing::warn!(service, exit_code = output.exit_code, "build failed");
    Ok(StageOutcome::failed(&error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwarmConfig;
    use crate::remote::fake::FakeSwarm;
    use std::sync::Arc;

    #[test]
    fn test_image_tag() {
        assert_eq!(image_tag("MyApp"), "myapp:latest");
    }

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path("/srv/api", "."), "/srv/api");
        assert_eq!(resolve_path("/srv/api", "./app/"), "/srv/api/app");
        assert_eq!(resolve_path("/srv/api", "/abs/ctx"), "/abs/ctx");
        assert_eq!(resolve_path("/srv/api", "Dockerfile.prod"), "/srv/api/Dockerfile.prod");
    }

    #[tokio::test]
    async fn test_no_plan_is_silent_skip() {
        let fake = Arc::new(FakeSwarm::new());
        let swarm = SwarmClient::new(fake.clone(), &SwarmConfig::default());
        let outcome = build_service(&swarm, "api", "/srv/api", None).await.unwrap();
        assert_eq!(outcome, StageOutcome::skipped("no build descriptor"));
        assert!(fake.commands().is_empty());
    }

    #[tokio::test]
    async fn test_failed_build_is_reported() {
        let fake = Arc::new(FakeSwarm::new().failing_build("api:latest"));
        let swarm = SwarmClient::new(fake.clone(), &SwarmConfig::default());
        let plan = EmbeddedBuild {
            context: ".".into(),
            dockerfile: None,
        };
        let outcome = build_service(&swarm, "api", "/srv/api", Some(&plan)).await.unwrap();
        assert!(outcome.is_failed());
        assert_eq!(fake.commands(), vec!["docker build -t api:latest /srv/api"]);
    }
}
