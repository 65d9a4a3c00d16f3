use entangle::cli;

fn main() -> anyhow::Result<()> {
    if let Err(e) = cli::run() {
        let msg = e.to_string();
        // Diagnostics or the usage text have already been printed.
        if msg == "binding generation failed" && e.chain().count() == 1 || msg == "usage error" {
            std::process::exit(1);
        }
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
    Ok(())
}
