use std::error::Error;
use std::fs;
use std::path::Path;

use libp2p::identity;

/// Loads the node keypair from `path`, generating and persisting one on first run.
pub fn load_or_generate_local_key(path: &str) -> Result<identity::Keypair, Box<dyn Error>> {
    let key_path = Path::new(path);
    if key_path.exists() {
        let bytes = fs::read(key_path)?;
        let keypair = identity::Keypair::from_protobuf_encoding(&bytes)
            .map_err(|e| format!("Failed to decode identity key {path}: {e}"))?;
        log::info!("Loaded persisted identity key from {path}");
        Ok(keypair)
    } else {
        if let Some(parent) = key_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let keypair = identity::Keypair::generate_ed25519();
        let encoded = keypair
            .to_protobuf_encoding()
            .map_err(|e| format!("Failed to encode identity key: {e}"))?;
        fs::write(key_path, encoded)?;
        log::info!("Generated new identity key and saved to {path}");
        Ok(keypair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_key_is_reused_on_next_load() {
        let dir = std::env::temp_dir().join(format!("room-chat-key-{}", uuid::Uuid::new_v4()));
        let path = dir.join("node_key.pk");
        let path = path.to_string_lossy().to_string();

        let first = load_or_generate_local_key(&path).unwrap();
        let second = load_or_generate_local_key(&path).unwrap();
        assert_eq!(first.public().to_peer_id(), second.public().to_peer_id());

        let _ = fs::remove_dir_all(dir);
    }
}
