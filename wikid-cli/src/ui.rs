use wikid_engine::server::ServerConfig;

/// Prints the startup banner.
pub fn print_banner(listen_addr: &str, config: &ServerConfig) {
    let templates = config
        .templates_dir
        .as_ref()
        .map_or_else(|| "built-in".to_string(), |d| d.display().to_string());

    println!();
    println!("╔══════════════════════════════════════════════════════╗");
    println!("║                     wikid                            ║");
    println!("╠══════════════════════════════════════════════════════╣");
    println!("║  Listen    : {:<39} ║", format!("http://{listen_addr}"));
    println!("║  Pages in  : {:<39} ║", config.data_dir.display().to_string());
    println!("║  Templates : {templates:<39} ║");
    println!("╚══════════════════════════════════════════════════════╝");
    println!();
    println!("  Open http://{listen_addr}/view/FrontPage to get started.");
    println!("  Press Ctrl-C to stop.");
    println!();
}
