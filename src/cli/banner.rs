//! Startup banner for interactive `run` sessions.

use owo_colors::{OwoColorize, Style};

/// Print the startup banner. `owo-colors` auto-detects whether stdout
/// supports color and falls back to plain text otherwise.
pub fn print_banner() {
    let anvil = Style::new().truecolor(120, 120, 130);
    let spark = Style::new().truecolor(255, 180, 90);
    let title = Style::new().bold().truecolor(210, 170, 110);
    let subtitle = Style::new().truecolor(100, 100, 120);

    println!();
    println!("      {}", "\\|/".style(spark));
    println!(
        "    {}       {}",
        "--===--".style(anvil),
        "  _   _      _    __                    ".style(title)
    );
    println!(
        "   {}      {}",
        "/       \\".style(anvil),
        " | |_(_) ___| | _/ _| ___  _ __ __ _  ___".style(title)
    );
    println!(
        "  {}     {}",
        "|=========|".style(anvil),
        " | __| |/ __| |/ / |_ / _ \\| '__/ _` |/ _ \\".style(title)
    );
    println!(
        "  {}     {}",
        "|_________|".style(anvil),
        " | |_| | (__|   <|  _| (_) | | | (_| |  __/".style(title)
    );
    println!(
        "   {}      {}",
        "\\_______/".style(anvil),
        "  \\__|_|\\___|_|\\_\\_|  \\___/|_|  \\__, |\\___|".style(title)
    );
    println!("                  {}", "                                  |___/".style(title));
    println!("{}", "        one tick at a time".style(subtitle));
    println!();
}
