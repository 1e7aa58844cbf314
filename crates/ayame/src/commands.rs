//! Host command builders for namespace, link and bridge primitives

use ayame_common::shell::{HostCommand, IP_CMD, OVS_VSCTL_CMD};

/// Suffix of the first endpoint of a veth pair
pub const LEFT_SUFFIX: &str = "left";

/// Suffix of the second endpoint of a veth pair
pub const RIGHT_SUFFIX: &str = "right";

/// Longest interface name the kernel accepts (IFNAMSIZ - 1)
pub const MAX_IFNAME_LEN: usize = 15;

/// Error text of `ip netns` for a namespace that does not exist.
pub const NETNS_MISSING: &str = "No such file or directory";

/// Build `ip netns add`
pub fn build_netns_add_cmd(namespace: &str) -> HostCommand {
    HostCommand::new(IP_CMD).args(["netns", "add", namespace])
}

/// Build `ip netns delete`
pub fn build_netns_delete_cmd(namespace: &str) -> HostCommand {
    HostCommand::new(IP_CMD).args(["netns", "delete", namespace])
}

/// Build the namespace existence probe
///
/// `ip netns pids` exits non-zero when the namespace file is missing, and
/// its error output then contains [`NETNS_MISSING`].
pub fn build_netns_pids_cmd(namespace: &str) -> HostCommand {
    HostCommand::new(IP_CMD).args(["netns", "pids", namespace])
}

/// Build `ip netns exec <ns> <argv...>`
pub fn build_netns_exec_cmd<I, S>(namespace: &str, argv: I) -> HostCommand
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    HostCommand::new(IP_CMD)
        .args(["netns", "exec", namespace])
        .args(argv)
}

/// Build veth pair creation
pub fn build_veth_add_cmd(left: &str, right: &str) -> HostCommand {
    HostCommand::new(IP_CMD).args(["link", "add", "name", left, "type", "veth", "peer", right])
}

/// Build device deletion
pub fn build_link_delete_cmd(device: &str) -> HostCommand {
    HostCommand::new(IP_CMD).args(["link", "delete", device])
}

/// Build move of a device into a namespace
pub fn build_link_set_netns_cmd(device: &str, namespace: &str) -> HostCommand {
    HostCommand::new(IP_CMD).args(["link", "set", device, "netns", namespace])
}

/// Build address assignment inside a namespace
pub fn build_addr_add_cmd(device: &str, namespace: &str, cidr: &str) -> HostCommand {
    build_netns_exec_cmd(namespace, ["ip", "addr", "add", cidr, "dev", device])
}

/// Build OVS bridge creation
pub fn build_add_br_cmd(bridge: &str) -> HostCommand {
    HostCommand::new(OVS_VSCTL_CMD).args(["add-br", bridge])
}

/// Build OVS bridge deletion
pub fn build_del_br_cmd(bridge: &str) -> HostCommand {
    HostCommand::new(OVS_VSCTL_CMD).args(["del-br", bridge])
}

/// Build attachment of a device to an OVS bridge
pub fn build_add_port_cmd(bridge: &str, device: &str) -> HostCommand {
    HostCommand::new(OVS_VSCTL_CMD).args(["add-port", bridge, device])
}

/// Endpoint names of the veth pair called `name`
pub fn veth_endpoint_names(name: &str) -> (String, String) {
    (
        format!("{}-{}", name, LEFT_SUFFIX),
        format!("{}-{}", name, RIGHT_SUFFIX),
    )
}

/// Name of the `index`-th veth pair attached to `bridge`
pub fn bridge_pair_name(bridge: &str, index: usize) -> String {
    format!("{}-{}", bridge, index)
}
