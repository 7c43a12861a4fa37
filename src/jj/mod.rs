//! Jujutsu integration: running jj, parsing its output, and modeling
//! changes and bookmarks.

mod bookmark;
mod change;
mod resolve;
mod runner;

pub use bookmark::{
    ensure_bookmarks, generate_bookmark_name, match_bookmarks_to_changes, parse_bookmark_list,
    BookmarkInfo, ChangeBookmark, RemoteBookmarkState, SyncState,
};
pub use change::{build_dags, parse_changes, Change, ChangeDag};
pub use resolve::resolve_stacks;
pub use runner::{parse_remote_list, JjRunner, Runner};
