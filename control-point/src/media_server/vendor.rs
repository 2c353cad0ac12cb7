//! Servers expose their browse hierarchies as plain storage folders named
//! "Albums", "By Artist", "[All Tracks]" and so on. Recognize the common
//! names and give those folders a meaningful icon and a consistent label.

use crate::content::{ContentKind, Icon, Node};

struct Rule {
    names: &'static [&'static str],
    label: Option<&'static str>,
    icon: Icon,
}

const RULES: &[Rule] = &[
    Rule {
        names: &["album", "albums", "all albums", "by album"],
        label: Some("Albums"),
        icon: Icon::Album,
    },
    Rule {
        names: &["artist", "artists", "all artists", "by artist", "album artist", "album artists"],
        label: None,
        icon: Icon::Artist,
    },
    Rule {
        names: &["genre", "genres", "by genre"],
        label: Some("Genres"),
        icon: Icon::Genre,
    },
    Rule {
        names: &["playlist", "playlists", "all playlists"],
        label: Some("Playlists"),
        icon: Icon::Playlist,
    },
    Rule {
        names: &["all tracks", "tracks", "songs", "all music", "all songs"],
        label: None,
        icon: Icon::TrackList,
    },
    Rule {
        names: &["folders", "by folder", "browse folders"],
        label: Some("Folders"),
        icon: Icon::Folder,
    },
];

/// Relabel a freshly classified storage folder in place. Other kinds are
/// left alone.
pub fn relabel(node: &mut Node) {
    let ContentKind::Folder { icon } = &mut node.kind else {
        return;
    };
    let key = normalize(&node.name);
    let Some(rule) = RULES.iter().find(|rule| rule.names.contains(&key.as_str())) else {
        return;
    };
    *icon = rule.icon;
    if let Some(label) = rule.label {
        node.name = label.to_string();
    }
}

/// Lowercase, with decoration some servers add (`[All Tracks]`,
/// `>> Albums`, `- Genres -`) stripped.
fn normalize(name: &str) -> String {
    name.trim_matches(|c: char| c.is_whitespace() || matches!(c, '[' | ']' | '>' | '<' | '-' | '*' | '.'))
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn folder(name: &str) -> Node {
        Node::collection(ContentKind::Folder { icon: Icon::Folder }, name, "1")
    }

    #[rstest]
    #[case("By Album", "Albums", Icon::Album)]
    #[case("[All Tracks]", "[All Tracks]", Icon::TrackList)]
    #[case("Album Artist", "Album Artist", Icon::Artist)]
    #[case(">> Genre", "Genres", Icon::Genre)]
    #[case("Browse Folders", "Folders", Icon::Folder)]
    #[case("Holiday 2019", "Holiday 2019", Icon::Folder)]
    fn test_relabel(#[case] name: &str, #[case] label: &str, #[case] icon: Icon) {
        let mut node = folder(name);
        relabel(&mut node);
        assert_eq!(node.name, label);
        assert_eq!(node.kind, ContentKind::Folder { icon });
    }

    #[test]
    fn test_real_albums_are_untouched() {
        let mut node = Node::collection(
            ContentKind::Album {
                artist: None,
                art_url: None,
            },
            "Albums",
            "1",
        );
        relabel(&mut node);
        assert_eq!(node.kind.icon(), Icon::Album);
        assert_eq!(node.name, "Albums");
    }
}
