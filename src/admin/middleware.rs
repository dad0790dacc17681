use axum::{
    extract::{ConnectInfo, Request},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};

/// 本机地址，包括 IPv4 映射的 IPv6 回环地址（双栈监听时常见）
fn is_loopback_peer(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_loopback(),
        IpAddr::V6(v6) => v6
            .to_ipv4_mapped()
            .map_or(v6.is_loopback(), |v4| v4.is_loopback()),
    }
}

/// 管理接口（/metrics）只对本机开放；站点和闸门不受影响
pub async fn loopback_only(
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
    next: Next,
) -> Response {
    if is_loopback_peer(peer.ip()) {
        return next.run(request).await;
    }

    let path = request.uri().path();
    tracing::warn!("拒绝来自 {} 的管理请求: {} {}", peer, request.method(), path);
    (
        StatusCode::FORBIDDEN,
        format!("{path} is only available to loopback clients"),
    )
        .into_response()
}
