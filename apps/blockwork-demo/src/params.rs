//! Command line parameters.

use std::path::PathBuf;

use blockwork_world::WorldSeed;

/// Demo parameters.
#[derive(Debug, Clone)]
pub struct DemoParams {
    /// Seed used when the world directory holds no world file yet.
    pub seed: WorldSeed,
    /// Horizontal chunk radius loaded around the spawn column.
    pub radius: i32,
    /// Physics steps simulated at 60 Hz.
    pub steps: u32,
    /// Directory for the world file and column files.
    pub world_dir: PathBuf,
}

impl Default for DemoParams {
    fn default() -> Self {
        Self {
            seed: 42,
            radius: 2,
            steps: 180,
            world_dir: std::env::temp_dir().join("blockwork-demo"),
        }
    }
}

impl DemoParams {
    /// Parse parameters from command line arguments.
    pub fn from_args() -> Self {
        Self::parse(std::env::args().skip(1))
    }

    fn parse(args: impl IntoIterator<Item = String>) -> Self {
        let mut params = Self::default();
        let args: Vec<String> = args.into_iter().collect();

        let mut i = 0;
        while i < args.len() {
            let value = args.get(i + 1);
            let consumed = match (args[i].as_str(), value) {
                ("--seed", Some(v)) => v.parse().map(|v| params.seed = v).is_ok(),
                ("--radius", Some(v)) => v.parse().map(|v| params.radius = v).is_ok(),
                ("--steps", Some(v)) => v.parse().map(|v| params.steps = v).is_ok(),
                ("--world", Some(v)) => {
                    params.world_dir = PathBuf::from(v);
                    true
                }
                _ => false,
            };
            i += if consumed { 2 } else { 1 };
        }

        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn defaults_without_arguments() {
        let params = DemoParams::parse(Vec::new());
        assert_eq!(params.seed, 42);
        assert_eq!(params.radius, 2);
    }

    #[test]
    fn parses_known_flags_and_skips_bad_values() {
        let params = DemoParams::parse(args(&[
            "--seed", "7", "--radius", "wide", "--steps", "30", "--world", "/tmp/w",
        ]));
        assert_eq!(params.seed, 7);
        assert_eq!(params.radius, 2);
        assert_eq!(params.steps, 30);
        assert_eq!(params.world_dir, PathBuf::from("/tmp/w"));
    }
}
