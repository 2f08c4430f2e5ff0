//! Shell scripts run inside the image for the built-in steps.
//!
//! Both scripts converge when re-run against an image that already went
//! through them, so a retried build never trips over its own leftovers.

const VERSION_PLACEHOLDER: &str = "@K8S_VERSION@";

const INSTALL_K8S: &str = r#"#!/bin/sh
set -eu
export DEBIAN_FRONTEND=noninteractive

apt-get update
apt-get install -y apt-transport-https ca-certificates curl gpg containerd

mkdir -p /etc/apt/keyrings
if [ ! -f /etc/apt/keyrings/kubernetes-apt-keyring.gpg ]; then
    curl -fsSL https://pkgs.k8s.io/core:/stable:/v@K8S_VERSION@/deb/Release.key \
        | gpg --dearmor -o /etc/apt/keyrings/kubernetes-apt-keyring.gpg
fi
echo 'deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/v@K8S_VERSION@/deb/ /' \
    > /etc/apt/sources.list.d/kubernetes.list

apt-get update
apt-get install -y kubelet kubeadm kubectl
apt-mark hold kubelet kubeadm kubectl

mkdir -p /etc/containerd
containerd config default | sed 's/SystemdCgroup = false/SystemdCgroup = true/' > /etc/containerd/config.toml

cat > /etc/modules-load.d/k8s.conf <<EOF
overlay
br_netfilter
EOF

cat > /etc/sysctl.d/k8s.conf <<EOF
net.bridge.bridge-nf-call-iptables = 1
net.bridge.bridge-nf-call-ip6tables = 1
net.ipv4.ip_forward = 1
EOF

systemctl enable containerd kubelet
"#;

// The appliance has no init system, so containerd is started by hand for the pull.
const PREPULL_K8S_IMAGES: &str = r#"#!/bin/sh
set -eu

SOCK=/run/containerd/containerd.sock

containerd > /var/log/vmbake-containerd.log 2>&1 &
CONTAINERD_PID=$!
trap 'kill $CONTAINERD_PID 2>/dev/null || true; wait $CONTAINERD_PID 2>/dev/null || true' EXIT

for _ in $(seq 1 30); do
    [ -S "$SOCK" ] && break
    sleep 1
done
if [ ! -S "$SOCK" ]; then
    echo "containerd did not start" >&2
    exit 1
fi

kubeadm config images pull \
    --kubernetes-version "$(kubeadm version -o short)" \
    --cri-socket "unix://$SOCK"
"#;

/// Script installing containerd and kubeadm/kubelet/kubectl from the
/// `kubernetes_version` release channel (e.g. "1.30").
pub fn install_k8s(kubernetes_version: &str) -> String {
    INSTALL_K8S.replace(VERSION_PLACEHOLDER, kubernetes_version)
}

/// Script pulling the control-plane images matching the installed kubeadm.
pub fn prepull_k8s_images() -> &'static str {
    PREPULL_K8S_IMAGES
}
