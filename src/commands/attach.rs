use crate::config::MergedConfig;
use crate::error::SidecarError;
use crate::infra::tmux::TmuxController;
use crate::supervisor::session;

pub fn execute(cfg: &MergedConfig, name: String) -> Result<(), SidecarError> {
    let session = session::session_name(cfg.session_prefix(), &name);
    TmuxController::attach_blocking(&session)
}
