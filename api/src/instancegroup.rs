use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    cluster::WarmPoolSpec,
    error::Error,
    names::{InstanceGroupName, SubnetName},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum InstanceGroupRole {
    ControlPlane,
    #[serde(rename = "APIServer")]
    ApiServer,
    Node,
    Bastion,
}

impl InstanceGroupRole {
    pub const ALL: [InstanceGroupRole; 4] = [
        InstanceGroupRole::ControlPlane,
        InstanceGroupRole::ApiServer,
        InstanceGroupRole::Node,
        InstanceGroupRole::Bastion,
    ];

    pub fn has_api_server(&self) -> bool {
        matches!(
            self,
            InstanceGroupRole::ControlPlane | InstanceGroupRole::ApiServer
        )
    }
}

impl fmt::Display for InstanceGroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstanceGroupRole::ControlPlane => "ControlPlane",
            InstanceGroupRole::ApiServer => "APIServer",
            InstanceGroupRole::Node => "Node",
            InstanceGroupRole::Bastion => "Bastion",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstanceGroupSpec {
    pub role: InstanceGroupRole,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subnets: Vec<SubnetName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warm_pool: Option<WarmPoolSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct InstanceGroup {
    pub name: InstanceGroupName,
    pub spec: InstanceGroupSpec,
}

impl InstanceGroup {
    pub fn has_api_server(&self) -> bool {
        self.spec.role.has_api_server()
    }

    pub fn validate(&self) -> Result<(), Error> {
        if let (Some(min), Some(max)) = (self.spec.min_size, self.spec.max_size)
            && min > max
        {
            return Err(Error::MinAboveMax {
                name: self.name.to_string(),
                min,
                max,
            });
        }
        if self.spec.role != InstanceGroupRole::Bastion && self.spec.subnets.is_empty() {
            return Err(Error::MissingSubnets(self.name.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(role: InstanceGroupRole) -> InstanceGroup {
        InstanceGroup {
            name: "nodes".parse().unwrap(),
            spec: InstanceGroupSpec {
                role,
                machine_type: None,
                image: None,
                min_size: Some(1),
                max_size: Some(3),
                subnets: vec!["us-east-1a".parse().unwrap()],
                packages: Vec::new(),
                warm_pool: None,
                kubernetes_version: None,
            },
        }
    }

    #[test]
    fn min_above_max_rejected() {
        let mut ig = group(InstanceGroupRole::Node);
        ig.spec.min_size = Some(5);
        ig.spec.max_size = Some(2);
        assert!(matches!(ig.validate(), Err(Error::MinAboveMax { .. })));
    }

    #[test]
    fn non_bastion_requires_subnets() {
        let mut ig = group(InstanceGroupRole::Node);
        ig.spec.subnets.clear();
        assert!(matches!(ig.validate(), Err(Error::MissingSubnets(_))));

        let mut bastion = group(InstanceGroupRole::Bastion);
        bastion.spec.subnets.clear();
        assert!(bastion.validate().is_ok());
    }

    #[test]
    fn api_server_roles() {
        assert!(group(InstanceGroupRole::ControlPlane).has_api_server());
        assert!(group(InstanceGroupRole::ApiServer).has_api_server());
        assert!(!group(InstanceGroupRole::Node).has_api_server());
    }

    #[test]
    fn role_serialization_matches_wire_names() {
        assert_eq!(
            serde_json::to_string(&InstanceGroupRole::ApiServer).unwrap(),
            "\"APIServer\""
        );
        assert_eq!(
            serde_json::to_string(&InstanceGroupRole::ControlPlane).unwrap(),
            "\"ControlPlane\""
        );
    }
}
