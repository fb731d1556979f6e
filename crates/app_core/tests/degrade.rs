//! Every public operation given a path that does not exist returns its
//! empty result instead of failing

use app_core::{IconOptions, IconService, ShellMetaConfig};
use app_fs::FileAttributes;

fn missing(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path()
        .join("no_such_dir")
        .join(name)
        .to_str()
        .unwrap()
        .to_string()
}

#[test]
fn file_system_layer_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let path = missing(&dir, "file.bin");

    assert!(!app_fs::open_for_read(&path, false, 0).is_valid());
    assert!(!app_fs::create_for_write(&path, true).is_valid());
    assert!(app_fs::read_string_from_file(&path).is_none());
    assert!(!app_fs::write_string_to_file(&path, "text", 0));
    assert!(!app_fs::write_overlapped(&path, vec![0; 16], |_| {}));
    assert!(app_fs::begin_overlapped_write(&path, vec![0; 16]).is_none());

    assert!(!app_fs::has_attribute(&path, FileAttributes::HIDDEN));
    assert!(!app_fs::set_attribute(&path, FileAttributes::HIDDEN));
    assert!(!app_fs::clear_attribute(&path, FileAttributes::READONLY));
    assert!(!app_fs::set_compression(&path, true));

    assert!(app_fs::parse_symlink(&path).is_none());
    assert!(app_fs::resolve_reparse_point(&path).is_err());
    assert_eq!(app_fs::alternate_streams(&path).count(), 0);

    assert!(app_fs::get_file_identity(&path).is_none());
    assert!(app_fs::get_folder_identity(&path).is_none());

    assert!(app_fs::size_on_disk(&path).is_none());
    assert!(app_fs::modified_time(&path).is_none());
    assert!(app_fs::find_data(&path).is_none());
    assert!(!app_fs::path_exists(&path));
}

#[test]
fn icon_layer_degrades() {
    let dir = tempfile::tempdir().unwrap();
    let path = missing(&dir, "file.bin");
    let service = IconService::with_platform(&ShellMetaConfig::default());

    assert!(service.resolve_overlay_badge(&path, false).is_none());
    assert!(service.extract_selected_icons(&path, &[0, 1, 2], 32).is_empty());
    assert!(service.extract_all_icons(&path).is_none());
    assert!(service.extract_string_from_dll(&path, 1).is_none());
    assert!(!service.set_custom_file_icon(&path, &path, 0));
    assert!(!service.set_custom_folder_icon(&missing(&dir, "folder"), Some(&path), 0));
    assert!(service
        .resolve_icon(&path, 48, false, IconOptions::THUMBNAIL_ONLY)
        .is_none());

    // The Windows shell still reports an icon for unknown paths by extension
    #[cfg(not(windows))]
    assert!(service
        .resolve_icon(&path, 48, false, IconOptions::empty())
        .is_none());
}
