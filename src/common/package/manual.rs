//! Manual install procedures: scripts, git clones and GitHub release assets.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use super::dispatch::{InstallError, InstallSettings};
use super::method::{ManualKind, ManualSpec, ReleaseAssetSpec};
use super::release::{Fetcher, select_asset};
use crate::common::process::{CommandRunner, CommandSpec};
use crate::common::shell::expand_path;
use crate::ui::prelude::*;

/// Borrowed collaborators of a manual install.
pub struct ManualContext<'a> {
    pub runner: &'a dyn CommandRunner,
    pub fetcher: &'a dyn Fetcher,
    pub settings: &'a InstallSettings,
}

pub async fn install(
    ctx: &ManualContext<'_>,
    name: &str,
    spec: &ManualSpec,
) -> Result<(), InstallError> {
    emit(
        Level::Debug,
        "install.manual",
        &format!("{}: manual {} install", name, spec.kind.type_name()),
        None,
    );
    match &spec.kind {
        ManualKind::Script { url, args } => install_script(ctx, url, args.as_deref()).await,
        ManualKind::GitClone { url } => {
            let dest = spec.dest.as_deref().unwrap_or_default();
            install_git_clone(ctx, url, dest).await
        }
        ManualKind::Deb(asset) => {
            let file = download_asset(ctx, asset).await?;
            ctx.runner
                .run(&CommandSpec::sudo("dpkg").arg("-i").arg(path_arg(file.path())))
                .await?;
            Ok(())
        }
        ManualKind::Rpm(asset) => {
            let file = download_asset(ctx, asset).await?;
            ctx.runner
                .run(&CommandSpec::sudo("dnf").args(["install", "-y"]).arg(path_arg(file.path())))
                .await?;
            Ok(())
        }
        ManualKind::AppImage(asset) => install_appimage(ctx, asset, spec.dest.as_deref()).await,
        ManualKind::Dmg(asset) => install_dmg(ctx, asset).await,
    }
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> InstallError {
    let path = path.to_path_buf();
    move |source| InstallError::Io {
        action,
        path,
        source,
    }
}

fn temp_file(suffix: &str) -> Result<NamedTempFile, InstallError> {
    tempfile::Builder::new()
        .prefix("dotinstall-")
        .suffix(suffix)
        .tempfile()
        .map_err(io_error("creating temp file in", &std::env::temp_dir()))
}

/// File extension of an asset name including the dot, e.g. `.deb`.
fn asset_suffix(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

/// Resolve the latest matching release asset and download it to a temp file.
async fn download_asset(
    ctx: &ManualContext<'_>,
    spec: &ReleaseAssetSpec,
) -> Result<NamedTempFile, InstallError> {
    let assets = ctx.fetcher.latest_release_assets(&spec.repo).await?;
    let asset = select_asset(&spec.repo, &spec.asset_pattern, &assets)?;
    let file = temp_file(&asset_suffix(&asset.name))?;
    ctx.fetcher
        .download(&asset.browser_download_url, file.path())
        .await?;
    Ok(file)
}

async fn install_script(
    ctx: &ManualContext<'_>,
    url: &str,
    args: Option<&str>,
) -> Result<(), InstallError> {
    let args = match args {
        Some(raw) => shell_words::split(raw).map_err(|source| InstallError::ScriptArgs {
            args: raw.to_string(),
            source,
        })?,
        None => Vec::new(),
    };

    let script = temp_file(".sh")?;
    ctx.fetcher.download(url, script.path()).await?;

    let cmd = CommandSpec::new(&ctx.settings.script_shell)
        .arg(path_arg(script.path()))
        .args(args);
    ctx.runner.run(&cmd).await?;
    Ok(())
}

async fn install_git_clone(ctx: &ManualContext<'_>, url: &str, dest: &str) -> Result<(), InstallError> {
    let dest = expand_path(dest);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(io_error("creating", parent))?;
    }
    ctx.runner
        .run(&CommandSpec::new("git").arg("clone").arg(url).arg(path_arg(&dest)))
        .await?;
    Ok(())
}

async fn install_appimage(
    ctx: &ManualContext<'_>,
    spec: &ReleaseAssetSpec,
    dest: Option<&str>,
) -> Result<(), InstallError> {
    let dest = match dest.map(str::trim).filter(|d| !d.is_empty()) {
        Some(dest) => expand_path(dest),
        None => ctx.settings.bin_dir.join(spec.repo_name()),
    };

    let assets = ctx.fetcher.latest_release_assets(&spec.repo).await?;
    let asset = select_asset(&spec.repo, &spec.asset_pattern, &assets)?;

    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(io_error("creating", parent))?;

    // Nothing appears at `dest` until the file is complete and executable,
    // since an existing `dest` counts as installed
    let staged = tempfile::Builder::new()
        .prefix(".dotinstall-")
        .tempfile_in(parent)
        .map_err(io_error("creating temp file in", parent))?;
    ctx.fetcher
        .download(&asset.browser_download_url, staged.path())
        .await?;
    fs::set_permissions(staged.path(), fs::Permissions::from_mode(0o755))
        .map_err(io_error("marking executable", staged.path()))?;
    staged
        .persist(&dest)
        .map_err(|e| io_error("moving download to", &dest)(e.error))?;
    Ok(())
}

/// Mount point reported by `hdiutil attach`.
///
/// Output rows are tab separated with the mount point last; volume names
/// may contain spaces.
pub fn parse_mount_point(output: &str) -> Option<PathBuf> {
    output
        .lines()
        .filter(|line| line.contains("/Volumes/"))
        .filter_map(|line| line.rsplit('\t').next())
        .map(str::trim)
        .rfind(|field| field.contains("/Volumes/"))
        .map(PathBuf::from)
}

/// Device node of the attached image, the first column of the first row.
pub fn parse_attach_device(output: &str) -> Option<&str> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .find(|field| field.starts_with("/dev/"))
}

/// First top-level `.app` bundle in a mounted image, by name.
fn find_app_bundle(mount: &Path) -> Result<PathBuf, InstallError> {
    let entries = fs::read_dir(mount).map_err(io_error("reading", mount))?;
    let mut bundles: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.extension().is_some_and(|ext| ext == "app"))
        .collect();
    bundles.sort();
    bundles
        .into_iter()
        .next()
        .ok_or_else(|| InstallError::NoAppBundle(mount.to_path_buf()))
}

async fn copy_app_bundle(ctx: &ManualContext<'_>, mount: &Path) -> Result<(), InstallError> {
    let bundle = find_app_bundle(mount)?;
    let Some(bundle_name) = bundle.file_name() else {
        return Err(InstallError::NoAppBundle(mount.to_path_buf()));
    };
    let target = ctx.settings.system_applications_dir.join(bundle_name);
    ctx.runner
        .run(
            &CommandSpec::new("cp")
                .arg("-R")
                .arg(path_arg(&bundle))
                .arg(path_arg(&target)),
        )
        .await?;
    Ok(())
}

async fn install_dmg(ctx: &ManualContext<'_>, spec: &ReleaseAssetSpec) -> Result<(), InstallError> {
    let image = download_asset(ctx, spec).await?;

    let attach = CommandSpec::new("hdiutil")
        .args(["attach", "-nobrowse"])
        .arg(path_arg(image.path()));
    let output = ctx.runner.run(&attach).await?;
    let Some(mount) = parse_mount_point(&output.stdout) else {
        if let Some(device) = parse_attach_device(&output.stdout) {
            detach_image(ctx, device).await;
        }
        return Err(InstallError::MountPointNotFound);
    };

    let copied = copy_app_bundle(ctx, &mount).await;

    // The image is detached whatever happened to the copy
    detach_image(ctx, &path_arg(&mount)).await;

    copied
}

/// Detach by mount point or device node. Failure is only reported.
async fn detach_image(ctx: &ManualContext<'_>, target: &str) {
    let detach = CommandSpec::new("hdiutil").arg("detach").arg(target);
    if let Err(err) = ctx.runner.run(&detach).await {
        emit(
            Level::Warn,
            "install.dmg_detach_failed",
            &format!("Could not detach {}: {}", target, err),
            None,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::package::testing::{FakeFetcher, FakeRunner};

    fn settings(apps: &Path, bin: &Path) -> InstallSettings {
        InstallSettings {
            application_dirs: Vec::new(),
            system_applications_dir: apps.to_path_buf(),
            bin_dir: bin.to_path_buf(),
            ..InstallSettings::default()
        }
    }

    fn manual(kind: ManualKind, dest: Option<String>) -> ManualSpec {
        ManualSpec {
            kind,
            dest,
            check_command: None,
            check_dir: None,
        }
    }

    fn zebar_dmg() -> ManualKind {
        ManualKind::Dmg(ReleaseAssetSpec {
            repo: "glzr-io/zebar".into(),
            asset_pattern: ".dmg".into(),
        })
    }

    #[test]
    fn test_parse_mount_point() {
        let out = "/dev/disk4          \tGUID_partition_scheme          \t\n\
                   /dev/disk4s1        \tApple_HFS                      \t/Volumes/Zebar 2.0\n";
        assert_eq!(parse_mount_point(out), Some(PathBuf::from("/Volumes/Zebar 2.0")));
        assert_eq!(parse_mount_point("/dev/disk4\tGUID\t\n"), None);
    }

    #[test]
    fn test_parse_attach_device() {
        let out = "/dev/disk5          \tGUID_partition_scheme          \t\n\
                   /dev/disk5s1        \tApple_HFS                      \t\n";
        assert_eq!(parse_attach_device(out), Some("/dev/disk5"));
        assert_eq!(parse_attach_device("expected CRC32 $1A2B\n"), None);
    }

    #[test]
    fn test_asset_suffix() {
        assert_eq!(asset_suffix("zebar-2.0-universal.dmg"), ".dmg");
        assert_eq!(asset_suffix("LICENSE"), "");
    }

    #[tokio::test]
    async fn test_dmg_detaches_when_copy_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let mount = tmp.path().join("Volumes").join("Zebar");
        fs::create_dir_all(mount.join("Zebar.app")).unwrap();

        let runner = FakeRunner::new()
            .respond(
                "hdiutil attach",
                0,
                &format!("/dev/disk4s1\tApple_HFS\t{}\n", mount.display()),
            )
            .fail("cp -R", "cp: /Applications/Zebar.app: Permission denied");
        let fetcher = FakeFetcher::new().with_release("glzr-io/zebar", &["zebar.dmg", "zebar.msi"]);
        let settings = settings(&tmp.path().join("Applications"), tmp.path());
        let ctx = ManualContext {
            runner: &runner,
            fetcher: &fetcher,
            settings: &settings,
        };

        let err = install(&ctx, "zebar", &manual(zebar_dmg(), None)).await.unwrap_err();
        assert!(err.to_string().contains("Permission denied"));

        let copy = runner.position("cp -R").unwrap();
        let detach = runner.position("hdiutil detach").unwrap();
        assert!(detach > copy);
        assert!(runner.calls()[detach].ends_with("Volumes/Zebar"));
    }

    #[tokio::test]
    async fn test_dmg_detaches_when_image_has_no_app() {
        let tmp = tempfile::tempdir().unwrap();
        let mount = tmp.path().join("Volumes").join("Empty");
        fs::create_dir_all(&mount).unwrap();

        let runner = FakeRunner::new().respond(
            "hdiutil attach",
            0,
            &format!("/dev/disk4s1\tApple_HFS\t{}\n", mount.display()),
        );
        let fetcher = FakeFetcher::new().with_release("glzr-io/zebar", &["zebar.dmg"]);
        let settings = settings(tmp.path(), tmp.path());
        let ctx = ManualContext {
            runner: &runner,
            fetcher: &fetcher,
            settings: &settings,
        };

        let err = install(&ctx, "zebar", &manual(zebar_dmg(), None)).await.unwrap_err();
        assert!(matches!(err, InstallError::NoAppBundle(_)));
        assert_eq!(runner.count_prefix("hdiutil detach"), 1);
        assert_eq!(runner.count_prefix("cp -R"), 0);
    }

    #[tokio::test]
    async fn test_dmg_detaches_device_without_mount_point() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new().respond(
            "hdiutil attach",
            0,
            "/dev/disk5\tGUID_partition_scheme\t\n/dev/disk5s1\tApple_HFS\t\n",
        );
        let fetcher = FakeFetcher::new().with_release("glzr-io/zebar", &["zebar.dmg"]);
        let settings = settings(tmp.path(), tmp.path());
        let ctx = ManualContext {
            runner: &runner,
            fetcher: &fetcher,
            settings: &settings,
        };

        let err = install(&ctx, "zebar", &manual(zebar_dmg(), None)).await.unwrap_err();
        assert!(matches!(err, InstallError::MountPointNotFound));
        assert_eq!(runner.count_prefix("hdiutil detach /dev/disk5"), 1);
        assert_eq!(runner.count_prefix("cp -R"), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_asset_fails_before_download() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let fetcher = FakeFetcher::new().with_release("o/tool", &["tool-amd64.deb", "tool-arm64.deb"]);
        let settings = settings(tmp.path(), tmp.path());
        let ctx = ManualContext {
            runner: &runner,
            fetcher: &fetcher,
            settings: &settings,
        };
        let deb = ManualKind::Deb(ReleaseAssetSpec {
            repo: "o/tool".into(),
            asset_pattern: ".deb".into(),
        });

        let err = install(&ctx, "tool", &manual(deb, None)).await.unwrap_err();
        assert!(err.to_string().contains("several assets"));
        assert!(fetcher.downloads().is_empty());
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_deb_installs_downloaded_file() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let fetcher = FakeFetcher::new().with_release("o/tool", &["tool-amd64.deb", "tool.rpm"]);
        let settings = settings(tmp.path(), tmp.path());
        let ctx = ManualContext {
            runner: &runner,
            fetcher: &fetcher,
            settings: &settings,
        };
        let deb = ManualKind::Deb(ReleaseAssetSpec {
            repo: "o/tool".into(),
            asset_pattern: "amd64.deb".into(),
        });

        install(&ctx, "tool", &manual(deb, None)).await.unwrap();
        assert_eq!(fetcher.downloads().len(), 1);
        let calls = runner.calls();
        assert!(calls[0].starts_with("sudo dpkg -i "));
        assert!(calls[0].ends_with(".deb"));
    }

    #[tokio::test]
    async fn test_appimage_defaults_to_bin_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("bin");
        let runner = FakeRunner::new();
        let fetcher = FakeFetcher::new().with_release("o/tool", &["tool-x86_64.AppImage"]);
        let settings = settings(tmp.path(), &bin);
        let ctx = ManualContext {
            runner: &runner,
            fetcher: &fetcher,
            settings: &settings,
        };
        let appimage = ManualKind::AppImage(ReleaseAssetSpec {
            repo: "o/tool".into(),
            asset_pattern: ".AppImage".into(),
        });

        install(&ctx, "tool", &manual(appimage, None)).await.unwrap();
        let installed = bin.join("tool");
        let mode = fs::metadata(&installed).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o755);
    }

    #[tokio::test]
    async fn test_appimage_failed_download_leaves_no_file() {
        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("bin");
        let runner = FakeRunner::new();
        let fetcher = FakeFetcher::new()
            .with_release("o/tool", &["tool-x86_64.AppImage"])
            .with_interrupted_downloads();
        let settings = settings(tmp.path(), &bin);
        let ctx = ManualContext {
            runner: &runner,
            fetcher: &fetcher,
            settings: &settings,
        };
        let appimage = ManualKind::AppImage(ReleaseAssetSpec {
            repo: "o/tool".into(),
            asset_pattern: ".AppImage".into(),
        });

        assert!(install(&ctx, "tool", &manual(appimage, None)).await.is_err());
        assert!(!bin.join("tool").exists());
        assert_eq!(fs::read_dir(&bin).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_script_passes_split_args() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();
        let fetcher = FakeFetcher::new();
        let settings = settings(tmp.path(), tmp.path());
        let ctx = ManualContext {
            runner: &runner,
            fetcher: &fetcher,
            settings: &settings,
        };
        let script = ManualKind::Script {
            url: "https://example.com/install.sh".into(),
            args: Some("--unattended --dir 'My Dir'".into()),
        };

        install(&ctx, "omz", &manual(script, None)).await.unwrap();
        assert_eq!(fetcher.downloads(), vec!["https://example.com/install.sh"]);
        let call = &runner.calls()[0];
        assert!(call.starts_with("bash "));
        assert!(call.ends_with(".sh --unattended --dir 'My Dir'"));
    }

    #[tokio::test]
    async fn test_git_clone_creates_parent() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("plugins").join("zsh-autosuggestions");
        let runner = FakeRunner::new();
        let fetcher = FakeFetcher::new();
        let settings = settings(tmp.path(), tmp.path());
        let ctx = ManualContext {
            runner: &runner,
            fetcher: &fetcher,
            settings: &settings,
        };
        let clone = ManualKind::GitClone {
            url: "https://github.com/zsh-users/zsh-autosuggestions".into(),
        };

        install(&ctx, "zsh-autosuggestions", &manual(clone, Some(dest.display().to_string())))
            .await
            .unwrap();
        assert!(tmp.path().join("plugins").is_dir());
        assert_eq!(
            runner.calls(),
            vec![format!(
                "git clone https://github.com/zsh-users/zsh-autosuggestions {}",
                dest.display()
            )]
        );
    }
}
