//! Built-in deployments.
//!
//! [`web_server`] declares a public network with one instance serving the
//! podinfo container on port 80.

use crate::resource::catalog::{
    INSTANCE, INTERNET_GATEWAY, ROUTE_TABLE, ROUTE_TABLE_ASSOCIATION, SECURITY_GROUP, SUBNET, VPC,
};
use crate::resource::{Deployment, Reference, ResourceNode, Value};

/// Amazon Linux 2023 image used when none is given.
pub const DEFAULT_AMI: &str = "ami-0f673487d7e5f89ca";

/// Instance size used when none is given.
pub const DEFAULT_INSTANCE_TYPE: &str = "t2.micro";

/// Boot script installing Docker and starting podinfo.
pub const PODINFO_USER_DATA: &str = "#!/bin/bash
sudo dnf update -y
sudo dnf install docker -y
sudo systemctl start docker
sudo systemctl enable docker
sudo docker run -d -p 80:9898 stefanprodan/podinfo
";

const ANYWHERE: &str = "0.0.0.0/0";

/// Parameters of the web-server deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyParams {
    /// Deployment name.
    pub name: String,
    /// Region; the subnet is placed in availability zone `<region>a`.
    pub region: String,
    /// Machine image.
    pub ami: String,
    /// Instance size.
    pub instance_type: String,
}

impl TopologyParams {
    /// Creates parameters for a region with the default image and size.
    #[must_use]
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            name: String::from("web-server"),
            region: region.into(),
            ami: DEFAULT_AMI.to_string(),
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
        }
    }

    /// Sets the machine image.
    #[must_use]
    pub fn with_ami(mut self, ami: impl Into<String>) -> Self {
        self.ami = ami.into();
        self
    }

    /// Sets the instance size.
    #[must_use]
    pub fn with_instance_type(mut self, instance_type: impl Into<String>) -> Self {
        self.instance_type = instance_type.into();
        self
    }
}

impl Default for TopologyParams {
    fn default() -> Self {
        Self::new("eu-central-1")
    }
}

/// Declares the web-server deployment.
///
/// Exports `public_ip`, the instance's public address.
#[must_use]
pub fn web_server(params: &TopologyParams) -> Deployment {
    Deployment::new(params.name.clone())
        .with_node(
            ResourceNode::new("main", VPC)
                .with_property("cidr_block", "10.0.0.0/16")
                .with_property("enable_dns_hostnames", true)
                .with_property("enable_dns_support", true),
        )
        .with_node(
            ResourceNode::new("igw", INTERNET_GATEWAY).with_property("vpc_id", Value::id_of("main")),
        )
        .with_node(
            ResourceNode::new("subnet", SUBNET)
                .with_property("vpc_id", Value::id_of("main"))
                .with_property("cidr_block", "10.0.1.0/24")
                .with_property("map_public_ip_on_launch", true)
                .with_property("availability_zone", format!("{}a", params.region)),
        )
        .with_node(
            ResourceNode::new("route_table", ROUTE_TABLE)
                .with_property("vpc_id", Value::id_of("main"))
                .with_property(
                    "routes",
                    Value::list([Value::map([
                        ("cidr_block", Value::from(ANYWHERE)),
                        ("gateway_id", Value::id_of("igw")),
                    ])]),
                ),
        )
        .with_node(
            ResourceNode::new("route_table_assoc", ROUTE_TABLE_ASSOCIATION)
                .with_property("subnet_id", Value::id_of("subnet"))
                .with_property("route_table_id", Value::id_of("route_table")),
        )
        .with_node(
            ResourceNode::new("sec_group", SECURITY_GROUP)
                .with_property("vpc_id", Value::id_of("main"))
                .with_property("description", "Allow SSH and HTTP inbound access")
                .with_property("ingress", Value::list([rule("tcp", 22, 22), rule("tcp", 80, 80)]))
                .with_property("egress", Value::list([rule("-1", 0, 0)])),
        )
        .with_node(
            ResourceNode::new("instance", INSTANCE)
                .with_property("instance_type", params.instance_type.as_str())
                .with_property("ami", params.ami.as_str())
                .with_property("vpc_security_group_ids", Value::list([Value::id_of("sec_group")]))
                .with_property("subnet_id", Value::id_of("subnet"))
                .with_property("user_data", PODINFO_USER_DATA),
        )
        .with_output("public_ip", Reference::new("instance", "public_ip"))
}

fn rule(protocol: &str, from_port: u16, to_port: u16) -> Value {
    Value::map([
        ("protocol", Value::from(protocol)),
        ("from_port", Value::from(from_port)),
        ("to_port", Value::from(to_port)),
        ("cidr_blocks", Value::list([ANYWHERE])),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphBuilder;
    use crate::resource::catalog;

    #[test]
    fn test_web_server_passes_catalog_schemas() {
        let deployment = web_server(&TopologyParams::default());
        let graph = GraphBuilder::new()
            .with_schema(catalog::network())
            .build(&deployment)
            .unwrap();

        assert_eq!(graph.len(), 7);
        assert_eq!(graph.outputs().len(), 1);
    }

    #[test]
    fn test_web_server_dependencies() {
        let graph = GraphBuilder::new()
            .build(&web_server(&TopologyParams::default()))
            .unwrap();

        assert_eq!(graph.dependencies("route_table"), vec!["main", "igw"]);
        assert_eq!(graph.dependencies("instance"), vec!["subnet", "sec_group"]);
        assert!(graph.depends_transitively("route_table_assoc", "main"));
        assert_eq!(graph.topological_order()[0].logical_name, "main");
    }

    #[test]
    fn test_availability_zone_follows_region() {
        let deployment = web_server(&TopologyParams::new("us-east-1").with_ami("ami-123"));
        let subnet = deployment.node("subnet").unwrap();
        assert_eq!(subnet.properties["availability_zone"].as_str(), Some("us-east-1a"));
        let instance = deployment.node("instance").unwrap();
        assert_eq!(instance.properties["ami"].as_str(), Some("ami-123"));
    }
}
