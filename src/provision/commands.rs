//! The fixed provisioning command plan.
//!
//! These sequences are wire-literal for the target CLI parser: exact
//! strings, exact order. Phase 1 lays down the baseline configuration and
//! persists it; the management-address change is issued separately because
//! it is expected to sever the connection. Phase 2 persists again on the
//! new address after the reboot.

/// Subnet mask applied with the management-address change.
pub const MANAGEMENT_NETMASK: &str = "255.255.240.0";

/// Enter the configuration context.
pub const ENTER_CONFIG: &str = "conf t";

/// Persist the running configuration to startup.
pub const PERSIST_CONFIG: &str = "copy running startup";

/// Port ranges that get per-interface spanning-tree and PTP enablement.
const PORT_RANGES: [&str; 4] = ["1/1-4", "2/1-8", "3/1-8", "4/1-8"];

/// The phase-1 baseline sequence, up to and including persistence.
///
/// `hostname` is the device name to assign; it doubles as the LLDP chassis
/// id. The management-address change is not part of this list — see
/// [`management_address_command`].
pub fn first_phase_commands(hostname: &str) -> Vec<String> {
    let mut commands = vec![
        ENTER_CONFIG.to_string(),
        format!("hostname {hostname}"),
        format!("lldp chassis-id-subtype local {hostname}"),
        "spanning-tree errordisable recovery-interval 30".to_string(),
        "spanning-tree max-age 6".to_string(),
        "spanning-tree hello-time 1".to_string(),
        "spanning-tree forward-time 4".to_string(),
        "spanning-tree priority 32768".to_string(),
        "rstp enable".to_string(),
        "ptp profile c37.238 mode transparent delay-mechanism p2p".to_string(),
        "ptp profile c37.238 domain 0".to_string(),
        "ptp enable".to_string(),
        "clock source ptp".to_string(),
        "clock timezone 1".to_string(),
        "snmp community read-write public".to_string(),
        "snmp-server version v1-v2c".to_string(),
        "snmp-server access enable".to_string(),
    ];

    for range in PORT_RANGES {
        commands.push(format!("interface ethernet {range}"));
        commands.push("spanning-tree".to_string());
        commands.push("ptp profile c37.238".to_string());
        commands.push("exit".to_string());
    }

    commands.push("exit".to_string());
    commands.push(PERSIST_CONFIG.to_string());
    commands
}

/// The management-address change issued from the configuration context.
pub fn management_address_command(new_address: &str) -> String {
    format!("ip management address {new_address} {MANAGEMENT_NETMASK}")
}

/// The phase-2 sequence, run on the new address after the reboot.
pub fn second_phase_commands() -> Vec<String> {
    vec![PERSIST_CONFIG.to_string()]
}
