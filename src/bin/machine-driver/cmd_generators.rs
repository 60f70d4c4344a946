use anyhow::Result;
use machine_driver::{toolpath::GeneratorRegistry, Config};

pub fn main(cfg: &Config) -> Result<()> {
    let registry = GeneratorRegistry::new(cfg.toolpath.clone().unwrap_or_default());
    let selected = registry.selected().ok().map(|descriptor| descriptor.name);

    for descriptor in registry.descriptors() {
        let marker = if Some(descriptor.name) == selected { "*" } else { " " };
        println!("{} {:20} {}", marker, descriptor.name, descriptor.description);
    }
    Ok(())
}
