/// Peer addresses are configured as `host:port`; tonic wants a URI.
pub fn format_peer_url(address: &str, tls_enabled: bool) -> String {
    if address.contains("://") {
        return address.to_string();
    }
    let scheme = if tls_enabled { "https" } else { "http" };
    format!("{}://{}", scheme, address)
}

/// Host part of a `host:port` address, used as the default TLS server name.
pub fn host_of(address: &str) -> &str {
    let without_scheme = address
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(address);
    match without_scheme.rsplit_once(':') {
        Some((host, _port)) => host,
        None => without_scheme,
    }
}

/// Short form of a transaction id for log prefixes, as the peer logs them.
pub fn short_txid(txid: &str) -> &str {
    match txid.char_indices().nth(8) {
        Some((index, _)) => &txid[..index],
        None => txid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peer_url_gets_scheme() {
        assert_eq!(format_peer_url("peer0:7052", false), "http://peer0:7052");
        assert_eq!(format_peer_url("peer0:7052", true), "https://peer0:7052");
        assert_eq!(format_peer_url("http://peer0:7052", true), "http://peer0:7052");
    }

    #[test]
    fn host_is_split_from_port() {
        assert_eq!(host_of("peer0.org1.example.com:7052"), "peer0.org1.example.com");
        assert_eq!(host_of("https://peer0:7052"), "peer0");
        assert_eq!(host_of("peer0"), "peer0");
    }

    #[test]
    fn txid_is_shortened() {
        assert_eq!(short_txid("0123456789abcdef"), "01234567");
        assert_eq!(short_txid("abc"), "abc");
    }
}
