//! Fault injection
//!
//! Stops the node agent on a worker by scheduling a privileged
//! "kubelet killer" pod onto it:
//! - `stop_kubelet` freezes the kubelet process on one node
//! - `cleanup` removes every killer pod left behind

mod kubelet;

pub use kubelet::KubeletKiller;
