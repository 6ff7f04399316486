//! All Paths are recorded here for use throughout this codebase
pub mod base {
    pub const ROOT: &str = "/";
    pub const HEALTH: &str = "/health";
    pub const ABOUT: &str = "/about";
}

pub mod control {
    pub const ESTIMATE: &str = "/estimate";
    pub const DEVIATION: &str = "/deviation";
    pub const NODES: &str = "/nodes";
    pub const CONNECTED: &str = "/connected";
    pub const WEIGHT: &str = "/nodes/:node_id/weight";
    pub const FAULTS: &str = "/nodes/:node_id/faults";
    pub const RESET: &str = "/nodes/:node_id/reset";
}

pub fn weight_path(node_id: u32) -> String {
    control::WEIGHT.replace(":node_id", &node_id.to_string())
}

pub fn faults_path(node_id: u32) -> String {
    control::FAULTS.replace(":node_id", &node_id.to_string())
}

pub fn reset_path(node_id: u32) -> String {
    control::RESET.replace(":node_id", &node_id.to_string())
}
