use crate::config::MergedConfig;
use crate::error::SidecarError;
use crate::infra::tmux::TmuxController;
use crate::supervisor::session;

pub async fn execute(cfg: &MergedConfig, name: String) -> Result<(), SidecarError> {
    let session = session::session_name(cfg.session_prefix(), &name);
    if !TmuxController::session_exists(&session).await? {
        println!("No session '{session}'");
        return Ok(());
    }
    session::stop_agent(&session).await?;
    println!("Stopped '{session}'");
    Ok(())
}
