//! Pure text transforms for boot-time configuration files
//!
//! Nothing here touches the filesystem: each function takes the current file
//! content and returns the new content, so the edits can be tested in
//! isolation and then written with a scoped write-then-rename.

/// Result of a text transform
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub content: String,
    pub changed: bool,
}

impl Edit {
    fn unchanged(content: &str) -> Self {
        Self {
            content: content.to_string(),
            changed: false,
        }
    }
}

/// A `dtparam=` setting in the firmware config (`config.txt`)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtParam<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl DtParam<'_> {
    /// The exact line this parameter is written as
    pub fn line(&self) -> String {
        format!("dtparam={}={}", self.name, self.value)
    }

    /// Does `line` set this parameter (commented out or not)?
    fn matches(&self, line: &str) -> bool {
        let body = line.trim().trim_start_matches('#').trim_start();
        body.strip_prefix("dtparam=")
            .and_then(|rest| rest.strip_prefix(self.name))
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('='))
    }
}

/// Whether the parameter is active with the desired value
///
/// The last uncommented line for the parameter wins, the way the firmware
/// reads the file.
pub fn is_param_set(content: &str, param: DtParam<'_>) -> bool {
    content
        .lines()
        .filter(|l| !l.trim_start().starts_with('#') && param.matches(l))
        .last()
        .is_some_and(|l| l.trim() == param.line())
}

/// Make the parameter's desired line the only line setting it
///
/// Every line mentioning the parameter (including commented-out ones) is
/// dropped and the desired line appended. When the file uses conditional
/// sections and the last one is not `[all]`, an `[all]` header is appended
/// first so the line applies to every board.
///
/// Already-converged content is returned unchanged.
pub fn set_param(content: &str, param: DtParam<'_>) -> Edit {
    let desired = param.line();
    let matching: Vec<&str> = content.lines().filter(|l| param.matches(l)).collect();
    if matching.len() == 1 && matching[0].trim() == desired {
        return Edit::unchanged(content);
    }

    let kept: Vec<&str> = content.lines().filter(|l| !param.matches(l)).collect();
    let mut out = kept.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }

    let last_section = kept
        .iter()
        .rev()
        .map(|l| l.trim())
        .find(|l| l.starts_with('[') && l.ends_with(']'));
    if last_section.is_some_and(|s| !s.eq_ignore_ascii_case("[all]")) {
        out.push_str("[all]\n");
    }

    out.push_str(&desired);
    out.push('\n');

    Edit {
        content: out,
        changed: true,
    }
}

/// Kernel module names treat `-` and `_` as the same character
pub fn normalize_module(name: &str) -> String {
    name.trim().replace('-', "_")
}

/// Whether a modules-load file (`/etc/modules`) lists the module
pub fn lists_module(content: &str, module: &str) -> bool {
    let wanted = normalize_module(module);
    content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_whitespace().next())
        .any(|name| normalize_module(name) == wanted)
}

/// Append the module to a modules-load file unless already listed
pub fn ensure_module(content: &str, module: &str) -> Edit {
    if lists_module(content, module) {
        return Edit::unchanged(content);
    }

    let mut out = content.to_string();
    if !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(module.trim());
    out.push('\n');

    Edit {
        content: out,
        changed: true,
    }
}

/// Whether `/proc/modules` content shows the module as loaded
pub fn module_loaded(proc_modules: &str, module: &str) -> bool {
    let wanted = normalize_module(module);
    proc_modules
        .lines()
        .filter_map(|l| l.split_whitespace().next())
        .any(|name| normalize_module(name) == wanted)
}

#[cfg(test)]
mod tests {
    use super::*;

    const I2C: DtParam<'static> = DtParam {
        name: "i2c_arm",
        value: "on",
    };

    #[test]
    fn test_set_param_appends_to_empty_file() {
        let edit = set_param("", I2C);
        assert!(edit.changed);
        assert_eq!(edit.content, "dtparam=i2c_arm=on\n");
    }

    #[test]
    fn test_set_param_replaces_commented_and_off_lines() {
        let content = "\
# Uncomment some or all of these to enable the optional hardware interfaces
#dtparam=i2c_arm=on
#dtparam=i2s=on
dtparam=spi=on
dtparam=i2c_arm=off
";
        let edit = set_param(content, I2C);
        assert!(edit.changed);
        assert_eq!(
            edit.content,
            "\
# Uncomment some or all of these to enable the optional hardware interfaces
#dtparam=i2s=on
dtparam=spi=on
dtparam=i2c_arm=on
"
        );
    }

    #[test]
    fn test_set_param_is_idempotent() {
        let once = set_param("dtparam=audio=on\n", I2C);
        let twice = set_param(&once.content, I2C);
        assert!(once.changed);
        assert!(!twice.changed);
        assert_eq!(twice.content, once.content);
    }

    #[test]
    fn test_set_param_keeps_converged_line_in_place() {
        let content = "dtparam=i2c_arm=on\ndtparam=audio=on\n";
        let edit = set_param(content, I2C);
        assert!(!edit.changed);
        assert_eq!(edit.content, content);
    }

    #[test]
    fn test_set_param_does_not_touch_similar_names() {
        let content = "dtparam=i2c_arm_baudrate=400000\n";
        let edit = set_param(content, I2C);
        assert_eq!(
            edit.content,
            "dtparam=i2c_arm_baudrate=400000\ndtparam=i2c_arm=on\n"
        );
    }

    #[test]
    fn test_set_param_escapes_conditional_section() {
        let content = "arm_64bit=1\n\n[pi4]\ndtoverlay=vc4-kms-v3d\n";
        let edit = set_param(content, I2C);
        assert_eq!(
            edit.content,
            "arm_64bit=1\n\n[pi4]\ndtoverlay=vc4-kms-v3d\n[all]\ndtparam=i2c_arm=on\n"
        );
        assert!(!set_param(&edit.content, I2C).changed);
    }

    #[test]
    fn test_set_param_no_extra_header_under_all() {
        let content = "[pi4]\narm_boost=1\n\n[all]\n";
        let edit = set_param(content, I2C);
        assert_eq!(edit.content, "[pi4]\narm_boost=1\n\n[all]\ndtparam=i2c_arm=on\n");
    }

    #[test]
    fn test_is_param_set_last_active_line_wins() {
        assert!(is_param_set("dtparam=i2c_arm=on\n", I2C));
        assert!(!is_param_set("#dtparam=i2c_arm=on\n", I2C));
        assert!(!is_param_set("dtparam=i2c_arm=on\ndtparam=i2c_arm=off\n", I2C));
        assert!(is_param_set("dtparam=i2c_arm=off\n  dtparam=i2c_arm=on  \n", I2C));
        assert!(!is_param_set("", I2C));
    }

    #[test]
    fn test_ensure_module() {
        let edit = ensure_module("# /etc/modules\nsnd-bcm2835", "i2c-dev");
        assert!(edit.changed);
        assert_eq!(edit.content, "# /etc/modules\nsnd-bcm2835\ni2c-dev\n");

        let again = ensure_module(&edit.content, "i2c-dev");
        assert!(!again.changed);
    }

    #[test]
    fn test_lists_module_normalizes_and_ignores_comments() {
        assert!(lists_module("i2c_dev\n", "i2c-dev"));
        assert!(!lists_module("# i2c-dev\n", "i2c-dev"));
        assert!(!lists_module("i2c-devx\n", "i2c-dev"));
    }

    #[test]
    fn test_module_loaded_reads_proc_format() {
        let proc_modules = "\
i2c_dev 20480 0 - Live 0x0000000000000000
i2c_bcm2835 16384 0 - Live 0x0000000000000000
";
        assert!(module_loaded(proc_modules, "i2c-dev"));
        assert!(!module_loaded(proc_modules, "spidev"));
    }
}
