use keel_api::{Cluster, InstanceGroup, InstanceGroupRole};

use crate::Error;

/// Role-derived scaling defaults: worker fleets start at two nodes, every
/// other role at one.
fn default_size(role: InstanceGroupRole) -> i32 {
    match role {
        InstanceGroupRole::Node => 2,
        InstanceGroupRole::ControlPlane
        | InstanceGroupRole::ApiServer
        | InstanceGroupRole::Bastion => 1,
    }
}

/// Fills the defaults a complete instance group carries and checks it
/// against the cluster. Idempotent, like the cluster populator.
pub fn populate_instance_group(
    cluster: &Cluster,
    ig: &InstanceGroup,
) -> Result<InstanceGroup, Error> {
    let mut ig = ig.clone();

    let min = ig.spec.min_size.unwrap_or_else(|| default_size(ig.spec.role));
    let max = ig.spec.max_size.unwrap_or(min.max(default_size(ig.spec.role)));
    ig.spec.min_size = Some(min);
    ig.spec.max_size = Some(max);

    if let Some(raw) = &ig.spec.kubernetes_version {
        ig.spec.kubernetes_version = Some(raw.strip_prefix('v').unwrap_or(raw).to_string());
    }

    ig.validate()?;
    for subnet in &ig.spec.subnets {
        if !cluster
            .spec
            .networking
            .subnets
            .iter()
            .any(|s| s.name == *subnet)
        {
            return Err(keel_api::Error::UnknownSubnet {
                name: ig.name.to_string(),
                subnet: subnet.to_string(),
            }
            .into());
        }
    }
    Ok(ig)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cluster() -> Cluster {
        serde_yaml::from_str(
            r#"
name: c1.example.com
spec:
  cloudProvider: aws
  networking:
    subnets:
      - name: us-east-1a
        zone: us-east-1a
        type: Public
"#,
        )
        .unwrap()
    }

    fn group(yaml: &str) -> InstanceGroup {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn node_groups_default_to_two() {
        let ig = group(
            r#"
name: nodes
spec:
  role: Node
  subnets: [us-east-1a]
"#,
        );
        let populated = populate_instance_group(&cluster(), &ig).unwrap();
        assert_eq!(populated.spec.min_size, Some(2));
        assert_eq!(populated.spec.max_size, Some(2));
    }

    #[test]
    fn control_plane_defaults_to_one_and_is_idempotent() {
        let ig = group(
            r#"
name: control-plane-us-east-1a
spec:
  role: ControlPlane
  subnets: [us-east-1a]
"#,
        );
        let first = populate_instance_group(&cluster(), &ig).unwrap();
        assert_eq!(first.spec.min_size, Some(1));
        let second = populate_instance_group(&cluster(), &first).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn explicit_sizes_are_kept() {
        let ig = group(
            r#"
name: nodes
spec:
  role: Node
  minSize: 3
  maxSize: 10
  subnets: [us-east-1a]
"#,
        );
        let populated = populate_instance_group(&cluster(), &ig).unwrap();
        assert_eq!(populated.spec.min_size, Some(3));
        assert_eq!(populated.spec.max_size, Some(10));
    }

    #[test]
    fn version_override_is_normalized() {
        let ig = group(
            r#"
name: nodes
spec:
  role: Node
  kubernetesVersion: v1.27.1
  subnets: [us-east-1a]
"#,
        );
        let populated = populate_instance_group(&cluster(), &ig).unwrap();
        assert_eq!(populated.spec.kubernetes_version.as_deref(), Some("1.27.1"));
    }

    #[test]
    fn unknown_subnet_rejected() {
        let ig = group(
            r#"
name: nodes
spec:
  role: Node
  subnets: [us-west-2a]
"#,
        );
        assert!(populate_instance_group(&cluster(), &ig).is_err());
    }
}
