//! Stack deploy stage

use super::build::resolve_path;
use crate::error::{Error, Result, summarize_output};
use crate::report::StageOutcome;
use crate::swarm::SwarmClient;
use tracing::{info, warn};

/// Apply the deployment descriptor under the service's own stack name
pub async fn deploy_service(
    swarm: &SwarmClient,
    service: &str,
    service_dir: &str,
    descriptor: Option<&str>,
) -> Result<StageOutcome> {
    let Some(descriptor) = descriptor else {
        return Ok(StageOutcome::skipped("no deployment descriptor"));
    };

    let path = resolve_path(service_dir, descriptor);
    info!(service, descriptor = %path, "deploying stack");
    let output = swarm.deploy_stack(service, &path).await?;
    if output.success() {
        return Ok(StageOutcome::succeeded("stack deployed"));
    }

    warn!(service, exit_code = output.exit_code, "deploy failed");
    Ok(StageOutcome::failed(&Error::Deploy {
        service: service.to_string(),
        exit_code: output.exit_code,
        output: summarize_output(&output.stdout, &output.stderr),
    }))
}
