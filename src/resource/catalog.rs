//! Built-in schemas for the network resource kinds.

use super::schema::{ResourceSchema, SchemaRegistry};

/// Virtual private network.
pub const VPC: &str = "ec2.vpc";
/// Internet gateway attached to a network.
pub const INTERNET_GATEWAY: &str = "ec2.internet_gateway";
/// Subnet within a network.
pub const SUBNET: &str = "ec2.subnet";
/// Route table within a network.
pub const ROUTE_TABLE: &str = "ec2.route_table";
/// Binding of a route table to a subnet.
pub const ROUTE_TABLE_ASSOCIATION: &str = "ec2.route_table_association";
/// Security group (stateful firewall).
pub const SECURITY_GROUP: &str = "ec2.security_group";
/// Compute instance.
pub const INSTANCE: &str = "ec2.instance";

/// Returns a registry describing the network and compute kinds.
#[must_use]
pub fn network() -> SchemaRegistry {
    SchemaRegistry::new()
        .with(
            ResourceSchema::new(VPC, "Isolated virtual network")
                .required(&["cidr_block"])
                .optional(&["enable_dns_hostnames", "enable_dns_support", "tags"])
                .outputs(&["id", "arn", "default_route_table_id"]),
        )
        .with(
            ResourceSchema::new(INTERNET_GATEWAY, "Gateway between a network and the internet")
                .required(&["vpc_id"])
                .optional(&["tags"])
                .outputs(&["id", "arn"]),
        )
        .with(
            ResourceSchema::new(SUBNET, "Address range within a network")
                .required(&["vpc_id", "cidr_block"])
                .optional(&["availability_zone", "map_public_ip_on_launch", "tags"])
                .outputs(&["id", "arn"]),
        )
        .with(
            ResourceSchema::new(ROUTE_TABLE, "Routing rules for a network")
                .required(&["vpc_id"])
                .optional(&["routes", "tags"])
                .outputs(&["id", "arn"]),
        )
        .with(
            ResourceSchema::new(ROUTE_TABLE_ASSOCIATION, "Route table bound to a subnet")
                .required(&["subnet_id", "route_table_id"])
                .outputs(&["id"]),
        )
        .with(
            ResourceSchema::new(SECURITY_GROUP, "Ingress and egress rules")
                .required(&["vpc_id"])
                .optional(&["description", "ingress", "egress", "tags"])
                .outputs(&["id", "arn"]),
        )
        .with(
            ResourceSchema::new(INSTANCE, "Virtual machine")
                .required(&["ami", "instance_type", "subnet_id"])
                .optional(&["vpc_security_group_ids", "user_data", "tags"])
                .outputs(&["id", "arn", "public_ip", "private_ip"]),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceType;

    #[test]
    fn test_network_catalog_kinds() {
        let registry = network();
        assert_eq!(registry.len(), 7);

        let instance = registry.get(&ResourceType::new(INSTANCE)).unwrap();
        assert!(instance.outputs.contains("public_ip"));
        assert!(instance.required.contains("ami"));
    }
}
