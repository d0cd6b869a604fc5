//! kube-apiserver flags

use tracing::debug;

use crate::context::{is_version_gte, ResolutionContext};
use crate::model::{ClusterSpecification, ComponentConfig, KubernetesConfig};

use super::{cert_path, cloud_provider_flags, flags, merge_layers, Component};

/// Placeholder substituted with the master's address at render time
pub const API_SERVER_IP_PLACEHOLDER: &str = "<kubernetesAPIServerIP>";

const ADMISSION_PLUGINS: &str =
    "NamespaceLifecycle,LimitRanger,ServiceAccount,DefaultStorageClass,DefaultTolerationSeconds";
const ADMISSION_WEBHOOKS: &str = "MutatingAdmissionWebhook,ValidatingAdmissionWebhook";
const ADMISSION_TAIL: &str = "ResourceQuota,DenyEscalatingExec,AlwaysPullImages";

const KUBELET_CLIENT_FLAGS: [&str; 2] = ["--kubelet-client-certificate", "--kubelet-client-key"];

fn statics(spec: &ClusterSpecification, ctx: &ResolutionContext, version: &str) -> ComponentConfig {
    let k8s = &spec.orchestrator_profile.kubernetes_config;
    let mut statics = flags([
        ("--bind-address", "0.0.0.0".to_string()),
        ("--advertise-address", API_SERVER_IP_PLACEHOLDER.to_string()),
        ("--allow-privileged", "true".to_string()),
        ("--anonymous-auth", "false".to_string()),
        ("--audit-log-path", "/var/log/kubeaudit/audit.log".to_string()),
        ("--insecure-port", "8080".to_string()),
        ("--secure-port", "443".to_string()),
        ("--service-account-lookup", "true".to_string()),
        ("--etcd-cafile", cert_path("ca.crt")),
        ("--etcd-certfile", cert_path("etcdclient.crt")),
        ("--etcd-keyfile", cert_path("etcdclient.key")),
        ("--etcd-servers", "https://127.0.0.1:2379".to_string()),
        ("--tls-cert-file", cert_path("apiserver.crt")),
        ("--tls-private-key-file", cert_path("apiserver.key")),
        ("--client-ca-file", cert_path("ca.crt")),
        ("--repair-malformed-updates", "false".to_string()),
        ("--service-account-key-file", cert_path("apiserver.key")),
        ("--kubelet-client-certificate", cert_path("client.crt")),
        ("--kubelet-client-key", cert_path("client.key")),
        ("--service-cluster-ip-range", k8s.service_cidr.clone()),
        ("--storage-backend", "etcd3".to_string()),
        ("--v", "4".to_string()),
    ]);

    if KubernetesConfig::is_true(k8s.enable_data_encryption_at_rest) {
        statics.insert(
            "--experimental-encryption-provider-config".to_string(),
            "/etc/kubernetes/encryption-config.yaml".to_string(),
        );
    }

    if k8s.enable_aggregated_apis {
        statics.extend(flags([
            ("--requestheader-client-ca-file", cert_path("proxy-ca.crt")),
            ("--proxy-client-cert-file", cert_path("proxy.crt")),
            ("--proxy-client-key-file", cert_path("proxy.key")),
            ("--requestheader-allowed-names", String::new()),
            (
                "--requestheader-extra-headers-prefix",
                "X-Remote-Extra-".to_string(),
            ),
            ("--requestheader-group-headers", "X-Remote-Group".to_string()),
            ("--requestheader-username-headers", "X-Remote-User".to_string()),
        ]));
    }

    statics.extend(cloud_provider_flags(k8s));

    if let Some(aad) = spec.aad_profile.as_ref() {
        statics.extend(flags([
            ("--oidc-username-claim", "oid".to_string()),
            ("--oidc-groups-claim", "groups".to_string()),
            ("--oidc-client-id", format!("spn:{}", aad.server_app_id)),
            (
                "--oidc-issuer-url",
                format!("https://sts.windows.net/{}/", aad.tenant_id),
            ),
        ]));
    }

    if is_version_gte(version, &ctx.gates.audit_policy) {
        statics.insert(
            "--audit-policy-file".to_string(),
            "/etc/kubernetes/addons/audit-policy.yaml".to_string(),
        );
    }

    statics
}

/// Admission flag accepted by the version, and the one it replaces or is replaced by
fn admission_keys(ctx: &ResolutionContext, version: &str) -> (&'static str, &'static str) {
    if is_version_gte(version, &ctx.gates.admission_plugins_flag) {
        ("--enable-admission-plugins", "--admission-control")
    } else {
        ("--admission-control", "--enable-admission-plugins")
    }
}

/// Admission flag name and plugin list for the version
fn admission(k8s: &KubernetesConfig, ctx: &ResolutionContext, version: &str) -> (&'static str, String) {
    let (key, _) = admission_keys(ctx, version);
    let mut plugins = if is_version_gte(version, &ctx.gates.admission_webhooks) {
        format!("{ADMISSION_PLUGINS},{ADMISSION_WEBHOOKS},{ADMISSION_TAIL}")
    } else {
        format!("{ADMISSION_PLUGINS},{ADMISSION_TAIL}")
    };
    if KubernetesConfig::is_true(k8s.enable_pod_security_policy) {
        plugins.push_str(",PodSecurityPolicy");
    }
    (key, plugins)
}

fn defaults(k8s: &KubernetesConfig, ctx: &ResolutionContext, version: &str) -> ComponentConfig {
    let mut defaults = flags([
        ("--audit-log-maxage", "30".to_string()),
        ("--audit-log-maxbackup", "10".to_string()),
        ("--audit-log-maxsize", "100".to_string()),
        ("--profiling", "false".to_string()),
    ]);
    if KubernetesConfig::is_true(k8s.enable_rbac) {
        defaults.insert("--authorization-mode".to_string(), "Node,RBAC".to_string());
    }
    let (key, plugins) = admission(k8s, ctx, version);
    defaults.insert(key.to_string(), plugins);
    defaults
}

/// Resolve the kube-apiserver flag map
pub fn resolve(spec: &mut ClusterSpecification, ctx: &ResolutionContext) {
    let version = spec.orchestrator_profile.orchestrator_version.clone();
    let statics = statics(spec, ctx, &version);
    let k8s = &mut spec.orchestrator_profile.kubernetes_config;
    let defaults = defaults(k8s, ctx, &version);

    let (_, rejected) = admission_keys(ctx, &version);
    k8s.apiserver_config.remove(rejected);
    merge_layers(&mut k8s.apiserver_config, &defaults, &statics);
    if !KubernetesConfig::is_true(k8s.enable_secure_kubelet) {
        for key in KUBELET_CLIENT_FLAGS {
            k8s.apiserver_config.remove(key);
        }
    }
    ctx.remove_unsupported_flags(Component::ApiServer, &mut k8s.apiserver_config, &version);
    debug!(flags = k8s.apiserver_config.len(), "Resolved API server flags");
}
