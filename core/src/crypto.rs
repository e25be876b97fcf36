use tracing::debug;

/// Installs the ring provider for rustls, used by the kube client's TLS
/// stack. A provider installed earlier is kept.
pub fn init_crypto() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("A rustls crypto provider is already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_crypto_is_repeatable() {
        init_crypto();
        init_crypto();
        assert!(rustls::crypto::CryptoProvider::get_default().is_some());
    }
}
