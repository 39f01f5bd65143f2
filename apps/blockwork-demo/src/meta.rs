//! World metadata kept in the world file.

use bincode::Options;
use blockwork_core::{Error, Result};
use blockwork_world::{Serializable, WorldSeed};
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Seed, spawn point and session count of a saved world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldMeta {
    pub seed: WorldSeed,
    pub spawn: Option<Vec3>,
    pub sessions: u32,
}

impl WorldMeta {
    pub const fn new(seed: WorldSeed) -> Self {
        Self {
            seed,
            spawn: None,
            sessions: 0,
        }
    }
}

impl Serializable for WorldMeta {
    fn key(&self) -> &str {
        "meta"
    }

    fn save(&self) -> Result<Vec<u8>> {
        bincode::DefaultOptions::new()
            .serialize(self)
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    fn load(&mut self, bytes: &[u8]) -> Result<()> {
        *self = bincode::DefaultOptions::new()
            .deserialize(bytes)
            .map_err(|e| Error::Serialization(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use blockwork_world::WorldFile;

    use super::*;

    #[test]
    fn meta_survives_the_world_file() {
        let meta = WorldMeta {
            seed: 99,
            spawn: Some(Vec3::new(1.0, 2.0, 3.0)),
            sessions: 4,
        };
        let bytes = WorldFile::encode(&[&meta]).unwrap();

        let mut restored = WorldMeta::new(0);
        assert_eq!(WorldFile::decode(&bytes, &mut [&mut restored]).unwrap(), 1);
        assert_eq!(restored, meta);
    }
}
