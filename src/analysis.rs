//! Post-run statistics: selfish-mining MPU (mined-blocks-per-unit) figures
//! and the `Analysis.txt` report, written the way the source's `analysis()`
//! function does, translated from printing straight to stdout/a single file
//! into a small in-memory report plus a writer so the numbers are testable
//! without touching the filesystem.

use std::fs;
use std::io::Write;
use std::path::Path;

use chrono::Utc;

use crate::config::SimConfig;
use crate::driver::Simulation;

#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub num_peers: usize,
    pub zeta1_pct: u32,
    pub zeta2_pct: u32,
    pub t_mean_seconds: f64,
    pub mean_block_time_seconds: f64,
    pub max_iterations: u64,
    pub adversary1_id: usize,
    pub adversary2_id: usize,
    pub blocks_in_chain_adversary1: u64,
    pub blocks_in_chain_adversary2: u64,
    pub total_blocks_mined_adversary1: u64,
    pub total_blocks_mined_adversary2: u64,
    pub total_blocks_in_chain: u64,
    pub total_blocks_mined: u64,
}

impl Report {
    pub fn mpu_adversary1(&self) -> f64 {
        ratio(self.blocks_in_chain_adversary1, self.total_blocks_mined_adversary1)
    }

    pub fn mpu_adversary2(&self) -> f64 {
        ratio(self.blocks_in_chain_adversary2, self.total_blocks_mined_adversary2)
    }

    pub fn mpu_overall(&self) -> f64 {
        ratio(self.total_blocks_in_chain, self.total_blocks_mined)
    }

    pub fn fraction_adversary1_in_main_chain(&self) -> f64 {
        ratio(self.blocks_in_chain_adversary1, self.total_blocks_in_chain)
    }

    pub fn fraction_adversary2_in_main_chain(&self) -> f64 {
        ratio(self.blocks_in_chain_adversary2, self.total_blocks_in_chain)
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("No of peers: {}\n", self.num_peers));
        out.push_str(&format!("Hashing_power_of_adversary1: {}\n", self.zeta1_pct));
        out.push_str(&format!("Hashing_power_of_adversary2: {}\n", self.zeta2_pct));
        out.push_str(&format!("Tmean: {}\n", self.t_mean_seconds));
        out.push_str(&format!("Max_iterations: {}\n", self.max_iterations));
        out.push_str(&format!("Mining_time: {}\n", self.mean_block_time_seconds));
        out.push_str(&format!("Adversary1 id: {}\n", self.adversary1_id));
        out.push_str(&format!("Adversary2 id: {}\n", self.adversary2_id));
        out.push_str(&format!("Adversary1 blocks in chain: {}\n", self.blocks_in_chain_adversary1));
        out.push_str(&format!("Total blocks mined by Adversary1: {}\n", self.total_blocks_mined_adversary1));
        out.push_str(&format!("Adversary2 blocks in chain: {}\n", self.blocks_in_chain_adversary2));
        out.push_str(&format!("Total blocks mined by Adversary2: {}\n", self.total_blocks_mined_adversary2));
        out.push_str(&format!("MPU node adv1: {}\n", self.mpu_adversary1()));
        out.push_str(&format!("MPU node adv2: {}\n", self.mpu_adversary2()));
        out.push_str(&format!("MPU node overall: {}\n", self.mpu_overall()));
        out.push_str(&format!("Fraction of Adversary1 blocks in main chain: {}\n", self.fraction_adversary1_in_main_chain()));
        out.push_str(&format!("Fraction of Adversary2 blocks in main chain: {}\n", self.fraction_adversary2_in_main_chain()));
        out
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Count, for one peer's view of the chain, how many blocks on its longest
/// chain (tip to genesis, genesis excluded) were mined by `adversary_id`.
fn blocks_in_chain_mined_by(sim: &Simulation, observer: usize, adversary_id: usize) -> u64 {
    let tree = &sim.peers[observer].tree;
    tree.path_to_genesis(tree.longest_chain_id())
        .into_iter()
        .filter(|block| !block.is_genesis() && block.miner == adversary_id as i64)
        .count() as u64
}

/// Pick a peer that is neither adversary nor a direct neighbor of either
/// adversary, so its view of the chain isn't biased by link proximity.
fn pick_unbiased_observer(sim: &Simulation) -> usize {
    let a1 = sim.links.adversary1_id;
    let a2 = sim.links.adversary2_id;
    (0..sim.peers.len())
        .find(|&i| i != a1 && i != a2 && !sim.peers[a1].neighbors.contains(&i) && !sim.peers[a2].neighbors.contains(&i))
        .unwrap_or(0)
}

pub fn build_report(sim: &Simulation) -> Report {
    let observer = pick_unbiased_observer(sim);
    let a1 = sim.links.adversary1_id;
    let a2 = sim.links.adversary2_id;

    Report {
        num_peers: sim.config.num_peers,
        zeta1_pct: sim.config.zeta1_pct,
        zeta2_pct: sim.config.zeta2_pct,
        t_mean_seconds: sim.config.t_mean_seconds,
        mean_block_time_seconds: sim.config.mean_block_time_seconds,
        max_iterations: sim.config.max_iterations,
        adversary1_id: a1,
        adversary2_id: a2,
        blocks_in_chain_adversary1: blocks_in_chain_mined_by(sim, observer, a1),
        blocks_in_chain_adversary2: blocks_in_chain_mined_by(sim, observer, a2),
        total_blocks_mined_adversary1: sim.peers[a1].blocks_mined,
        total_blocks_mined_adversary2: sim.peers[a2].blocks_mined,
        total_blocks_in_chain: sim.peers[0].tree.max_depth(),
        total_blocks_mined: sim.peers.iter().map(|p| p.blocks_mined).sum(),
    }
}

/// Create (or clear) `output_<params>/` under `config.output_root` and write
/// `Analysis.txt` into it.
pub fn write_report(config: &SimConfig, report: &Report) -> std::io::Result<()> {
    let dir = Path::new(&config.output_root).join(config.output_dir_name());
    if dir.exists() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                fs::remove_file(entry.path())?;
            }
        }
    } else {
        fs::create_dir_all(&dir)?;
    }
    let mut file = fs::File::create(dir.join("Analysis.txt"))?;
    file.write_all(format!("Generated: {}\n", Utc::now().to_rfc3339()).as_bytes())?;
    file.write_all(report.render().as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Cli;

    fn config(num_peers: usize, zeta1: u32, zeta2: u32, seed: u64) -> SimConfig {
        let cli = Cli {
            peers: num_peers,
            zeta1,
            zeta2,
            t_mean_ms: 100.0,
            mean_block_time_ms: 500.0,
            max_iterations: 5_000,
            seed: Some(seed),
            output_root: ".".to_string(),
        };
        SimConfig::from_cli(cli, 0).unwrap()
    }

    #[test]
    fn mpu_is_zero_not_nan_when_nothing_was_mined() {
        let report = Report {
            num_peers: 10,
            zeta1_pct: 0,
            zeta2_pct: 0,
            t_mean_seconds: 1.0,
            mean_block_time_seconds: 1.0,
            max_iterations: 100,
            adversary1_id: 0,
            adversary2_id: 1,
            blocks_in_chain_adversary1: 0,
            blocks_in_chain_adversary2: 0,
            total_blocks_mined_adversary1: 0,
            total_blocks_mined_adversary2: 0,
            total_blocks_in_chain: 0,
            total_blocks_mined: 0,
        };
        assert_eq!(report.mpu_adversary1(), 0.0);
        assert_eq!(report.mpu_overall(), 0.0);
    }

    #[test]
    fn build_report_picks_an_observer_outside_adversary_neighborhoods() {
        let mut sim = Simulation::new(config(10, 30, 0, 11));
        sim.run().unwrap();
        let observer = pick_unbiased_observer(&sim);
        let a1 = sim.links.adversary1_id;
        let a2 = sim.links.adversary2_id;
        assert_ne!(observer, a1);
        assert_ne!(observer, a2);
        assert!(!sim.peers[a1].neighbors.contains(&observer));
        assert!(!sim.peers[a2].neighbors.contains(&observer));
    }

    #[test]
    fn total_blocks_mined_is_at_least_the_adversary_counts() {
        let mut sim = Simulation::new(config(10, 20, 10, 12));
        sim.run().unwrap();
        let report = build_report(&sim);
        assert!(report.total_blocks_mined >= report.total_blocks_mined_adversary1 + report.total_blocks_mined_adversary2);
    }

    #[test]
    fn write_report_creates_analysis_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(10, 0, 0, 13);
        config.output_root = tmp.path().to_string_lossy().to_string();
        let mut sim = Simulation::new(config.clone());
        sim.run().unwrap();
        let report = build_report(&sim);
        write_report(&config, &report).unwrap();
        let analysis_path = tmp.path().join(config.output_dir_name()).join("Analysis.txt");
        assert!(analysis_path.exists());
        let contents = fs::read_to_string(analysis_path).unwrap();
        assert!(contents.contains("No of peers: 10"));
    }
}
