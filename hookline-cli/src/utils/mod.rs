use colored::Colorize;

pub mod format;

/// Success message with checkmark
pub fn success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Info message
pub fn info(message: &str) {
    println!("{} {}", "→".blue().bold(), message);
}

/// Warning message
pub fn warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Section header
pub fn section(title: &str) {
    println!("\n{}", title.bold().underline());
}
