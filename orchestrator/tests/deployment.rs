use std::path::{Path, PathBuf};

use orchestrator::{ScriptProvisioner, configs::OrchestratorConfig};

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..")
}

#[test]
fn shipped_config_loads_and_points_at_existing_scripts() {
    let root = repo_root();
    let config = OrchestratorConfig::load(&root.join("configs/orchestrator.json")).unwrap();

    let allocator = config.allocator_config();
    assert_eq!(allocator.capacity, 2);
    assert_eq!(allocator.node_address, "{node}:8080");

    let provisioner = ScriptProvisioner::new(
        root.join(&config.orchestrator.run_edge_path),
        root.join(&config.orchestrator.kill_edge_path),
    );
    provisioner.check().unwrap();
}
