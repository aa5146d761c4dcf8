//! Quota code to resource probe dispatch table.

use std::collections::HashMap;
use std::fmt;

/// Instance families counted by the standard on-demand vCPU quota.
pub const STANDARD_INSTANCE_FAMILIES: &[char] = &['a', 'c', 'd', 'h', 'i', 'm', 'r', 't', 'z'];

/// EBS volume type whose provisioned storage is summed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeType {
    Gp2,
    Gp3,
    Io1,
    Io2,
}

impl VolumeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeType::Gp2 => "gp2",
            VolumeType::Gp3 => "gp3",
            VolumeType::Io1 => "io1",
            VolumeType::Io2 => "io2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadBalancerKind {
    Application,
    Network,
}

impl LoadBalancerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancerKind::Application => "application",
            LoadBalancerKind::Network => "network",
        }
    }
}

/// A countable resource in one region.
///
/// Implementors of [`crate::provider::ResourceInventory`] decide how each kind
/// is counted; the helpers in [`crate::usage::inventory`] cover the kinds whose
/// counting rule is not a plain list length.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResourceKind {
    EksClusters,
    EksNodeGroups,
    EksFargateProfiles,
    EksAddons,
    /// Total vCPUs of running instances whose type starts with one of `families`.
    RunningVcpus { families: &'static [char] },
    ElasticIps,
    KeyPairs,
    OwnedImages,
    OwnedSnapshots,
    InternetGateways,
    /// NAT gateways that are available or pending.
    NatGateways,
    /// Provisioned storage of one volume type, in TiB.
    VolumeStorageTib { volume_type: VolumeType },
    Vpcs,
    NetworkInterfaces,
    SecurityGroups,
    LoadBalancers { kind: LoadBalancerKind },
    TargetGroups,
    AutoScalingGroups,
    S3Buckets,
    LambdaFunctions,
    RdsInstances,
    RdsClusters,
    DynamoDbTables,
    CloudFrontDistributions,
    PublicHostedZones,
    IamUsers,
    IamRoles,
    IamGroups,
    /// Customer-managed IAM policies.
    IamLocalPolicies,
    SnsTopics,
    SqsQueues,
    EcrRepositories,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceKind::RunningVcpus { .. } => f.write_str("running_vcpus"),
            ResourceKind::VolumeStorageTib { volume_type } => {
                write!(f, "volume_storage_tib[{}]", volume_type.as_str())
            }
            ResourceKind::LoadBalancers { kind } => write!(f, "load_balancers[{}]", kind.as_str()),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Which resource a quota code is probed with, and for which service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeEntry {
    pub service_code: String,
    pub kind: ResourceKind,
}

const BUILTIN_PROBES: &[(&str, &str, ResourceKind)] = &[
    ("L-1194D53C", "eks", ResourceKind::EksClusters),
    ("L-6D3F50E6", "eks", ResourceKind::EksNodeGroups),
    ("L-23414FF3", "eks", ResourceKind::EksFargateProfiles),
    ("L-6E77F4DE", "eks", ResourceKind::EksAddons),
    ("L-1216C47A", "ec2", ResourceKind::RunningVcpus { families: STANDARD_INSTANCE_FAMILIES }),
    ("L-0263D0A3", "ec2", ResourceKind::ElasticIps),
    ("L-0E3CBAB9", "ec2", ResourceKind::KeyPairs),
    ("L-0DA580E9", "ec2", ResourceKind::OwnedImages),
    ("L-309BACF6", "ec2", ResourceKind::OwnedSnapshots),
    ("L-407747CB", "ec2", ResourceKind::InternetGateways),
    ("L-FE5A380F", "ec2", ResourceKind::NatGateways),
    ("L-D18FCD1D", "ebs", ResourceKind::VolumeStorageTib { volume_type: VolumeType::Gp2 }),
    ("L-7A658B76", "ebs", ResourceKind::VolumeStorageTib { volume_type: VolumeType::Gp3 }),
    ("L-FD252861", "ebs", ResourceKind::VolumeStorageTib { volume_type: VolumeType::Io1 }),
    ("L-09BD8365", "ebs", ResourceKind::VolumeStorageTib { volume_type: VolumeType::Io2 }),
    ("L-F678F1CE", "vpc", ResourceKind::Vpcs),
    ("L-DF5E4CA3", "vpc", ResourceKind::NetworkInterfaces),
    ("L-E79EC296", "vpc", ResourceKind::SecurityGroups),
    (
        "L-53DA6B97",
        "elasticloadbalancing",
        ResourceKind::LoadBalancers { kind: LoadBalancerKind::Application },
    ),
    (
        "L-69A177A2",
        "elasticloadbalancing",
        ResourceKind::LoadBalancers { kind: LoadBalancerKind::Network },
    ),
    ("L-B22855CB", "elasticloadbalancing", ResourceKind::TargetGroups),
    ("L-CDE20ADC", "autoscaling", ResourceKind::AutoScalingGroups),
    ("L-DC2B2D3D", "s3", ResourceKind::S3Buckets),
    ("L-9FEE3D26", "lambda", ResourceKind::LambdaFunctions),
    ("L-7B6409FD", "rds", ResourceKind::RdsInstances),
    ("L-952B80B8", "rds", ResourceKind::RdsClusters),
    ("L-F98FE922", "dynamodb", ResourceKind::DynamoDbTables),
    ("L-5B2E3F44", "cloudfront", ResourceKind::CloudFrontDistributions),
    ("L-ACB674F3", "route53", ResourceKind::PublicHostedZones),
    ("L-4019AD8D", "iam", ResourceKind::IamUsers),
    ("L-FE177D64", "iam", ResourceKind::IamRoles),
    ("L-0DA4ABF3", "iam", ResourceKind::IamGroups),
    ("L-D0B7243C", "iam", ResourceKind::IamLocalPolicies),
    ("L-61103206", "sns", ResourceKind::SnsTopics),
    ("L-75826ACE", "sqs", ResourceKind::SqsQueues),
    ("L-CFEB8E8D", "ecr", ResourceKind::EcrRepositories),
];

/// Immutable quota-code lookup, built once and shared behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct ProbeRegistry {
    entries: HashMap<String, ProbeEntry>,
}

impl ProbeRegistry {
    /// The well-known quota codes with a direct resource count.
    pub fn builtin() -> Self {
        BUILTIN_PROBES
            .iter()
            .fold(Self::builder(), |b, (code, service, kind)| b.register(*code, *service, kind.clone()))
            .build()
    }

    pub fn builder() -> ProbeRegistryBuilder {
        ProbeRegistryBuilder::default()
    }

    pub fn get(&self, quota_code: &str) -> Option<&ProbeEntry> {
        self.entries.get(quota_code)
    }

    /// Probe for `quota_code` if it is registered for `service_code`.
    pub fn lookup(&self, service_code: &str, quota_code: &str) -> Option<&ProbeEntry> {
        self.get(quota_code).filter(|entry| entry.service_code == service_code)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct ProbeRegistryBuilder {
    entries: HashMap<String, ProbeEntry>,
}

impl ProbeRegistryBuilder {
    /// Register a probe. A later registration for the same quota code wins.
    pub fn register(
        mut self,
        quota_code: impl Into<String>,
        service_code: impl Into<String>,
        kind: ResourceKind,
    ) -> Self {
        self.entries
            .insert(quota_code.into(), ProbeEntry { service_code: service_code.into(), kind });
        self
    }

    pub fn build(self) -> ProbeRegistry {
        ProbeRegistry { entries: self.entries }
    }
}
