pub mod hardlink;
pub mod read;
pub mod sparse;
pub mod write;

pub use hardlink::{CheckoutHardlinkTracker, HardlinkTracker};
pub use read::{read_symlink_target, read_xattrs, FileMetadata, FileType};
pub use sparse::{detect_sparse_regions, read_data_regions, write_sparse_file};
pub use write::{
    apply_metadata, create_block_device, create_char_device, create_directory, create_fifo,
    create_hardlink, create_socket_placeholder, create_symlink, fsync_dir, fsync_file,
    read_bare_user_ownership, stamp_bare_user_ownership,
};
