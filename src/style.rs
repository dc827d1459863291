//! Terminal styling utilities
//!
//! One small palette for all CLI output:
//! - Semantic colors for status (green/yellow/red)
//! - Cyan for headers and technical terms
//! - Dim for secondary information

use crossterm::style::Stylize;

/// Extension trait for consistent deskmode styling
///
/// # Examples
///
/// ```
/// use deskmode::style::DeskStyle;
///
/// println!("{}", "DISPLAYS:".header());
/// println!("{}", "applied".success());
/// println!("{}", "HDMI-1".technical());
/// ```
pub trait DeskStyle: Stylize {
    /// Section headers (cyan bold)
    fn header(self) -> <<Self as Stylize>::Styled as Stylize>::Styled
    where
        Self: Sized,
        <Self as Stylize>::Styled: Stylize,
    {
        self.cyan().bold()
    }

    /// Positive states: "enabled", "default", success messages
    fn success(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.green()
    }

    /// Problems: "not found", failure messages
    fn error(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.red()
    }

    /// Partial states: "off", unmapped roles
    fn warning(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.yellow()
    }

    /// Device names, paths, counts
    fn technical(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.cyan()
    }

    /// Secondary details such as descriptions and ids
    fn secondary(self) -> <Self as Stylize>::Styled
    where
        Self: Sized,
    {
        self.dim()
    }
}

impl<T: Stylize> DeskStyle for T {}
