// Secret labels
pub const CLUSTER_NAME_LABEL: &str = "cluster.x-k8s.io/cluster-name";

// Node labels
pub const CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/control-plane";
