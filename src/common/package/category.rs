//! Grouping of packages into display categories.

use std::collections::HashMap;

use super::catalog::Package;

/// Catch-all for packages without a category
pub const OTHER_CATEGORY: &str = "Other";

/// Display order of the known categories
pub const CATEGORY_ORDER: &[&str] = &[
    "System Tools",
    "Editors",
    "Terminal Tools",
    "Development",
    "GUI Applications",
    "Shell & Prompt",
    "GitHub",
    "Containers",
    "Proton",
    "Utilities",
];

#[derive(Debug, Clone)]
pub struct PackageCategory<'a> {
    pub name: &'static str,
    pub packages: Vec<&'a Package>,
}

/// Category a package name belongs to.
pub fn category_for(name: &str) -> &'static str {
    match name {
        "git" | "curl" | "zsh" | "make" | "build-essential" | "ripgrep" | "jq" | "bat" => {
            "System Tools"
        }

        "neovim" | "helix" | "fresh-editor" | "visual-studio-code" | "zed" => "Editors",

        "fzf" | "eza" | "bottom" | "zoxide" | "zellij" | "lazygit" | "lazydocker" | "glow"
        | "television" | "difftastic" | "ghostty" => "Terminal Tools",

        "node" | "npm" | "nvm" | "go" | "uv" | "python3-pip" | "pre-commit" | "biome"
        | "ipython" | "jupyter" | "just" | "act" | "rumdl" | "djlint" | "harlequin"
        | "euporie" => "Development",

        "zen-browser" | "claude" | "claude-code" | "raycast" | "obsidian" | "thunderbird"
        | "gimp" | "flameshot" | "protonvpn" | "localsend" | "httpie-desktop" | "ente-auth"
        | "proton-pass" | "alt-tab" | "logi-options-plus" => "GUI Applications",

        "oh-my-zsh" | "zsh-autosuggestions" | "zsh-syntax-highlighting" | "pure-prompt" => {
            "Shell & Prompt"
        }

        "rclone" | "rclone-ui" | "topgrade" | "httpie" | "vhs" | "gum" | "hyperfine" | "fx"
        | "zola" | "vhs-eget" | "tv" | "crush" | "eget" | "intelli-shell" | "dockutil" => {
            "Utilities"
        }

        "gh" | "gh-dash" | "gama" => "GitHub",

        "podman" => "Containers",

        "proton-pass-cli" => "Proton",

        _ => OTHER_CATEGORY,
    }
}

/// Group packages by category.
///
/// Categories come out in [`CATEGORY_ORDER`] with "Other" last; empty
/// categories are omitted and packages inside each are sorted by name.
pub fn categorize<'a, I>(packages: I) -> Vec<PackageCategory<'a>>
where
    I: IntoIterator<Item = &'a Package>,
{
    let mut groups: HashMap<&'static str, Vec<&'a Package>> = HashMap::new();
    for pkg in packages {
        groups.entry(category_for(&pkg.name)).or_default().push(pkg);
    }

    CATEGORY_ORDER
        .iter()
        .chain(std::iter::once(&OTHER_CATEGORY))
        .filter_map(|name| {
            let mut packages = groups.remove(name)?;
            packages.sort_by(|a, b| a.name.cmp(&b.name));
            Some(PackageCategory { name, packages })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn pkg(name: &str) -> Package {
        Package {
            name: name.to_string(),
            description: String::new(),
            methods: BTreeMap::new(),
        }
    }

    #[test]
    fn test_category_for() {
        assert_eq!(category_for("ripgrep"), "System Tools");
        assert_eq!(category_for("gh-dash"), "GitHub");
        assert_eq!(category_for("podman"), "Containers");
        assert_eq!(category_for("something-new"), OTHER_CATEGORY);
    }

    #[test]
    fn test_categorize_orders_and_sorts() {
        let pkgs = vec![
            pkg("zoxide"),
            pkg("mystery"),
            pkg("fzf"),
            pkg("git"),
            pkg("aardvark"),
            pkg("gh"),
        ];
        let categories = categorize(&pkgs);

        let names: Vec<&str> = categories.iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["System Tools", "Terminal Tools", "GitHub", "Other"]);

        let terminal: Vec<&str> = categories[1]
            .packages
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(terminal, vec!["fzf", "zoxide"]);

        let other: Vec<&str> = categories[3]
            .packages
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        assert_eq!(other, vec!["aardvark", "mystery"]);
    }

    #[test]
    fn test_categorize_empty() {
        assert!(categorize(std::iter::empty()).is_empty());
    }
}
