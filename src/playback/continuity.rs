use crate::models::PlaybackItem;
use serde::{Deserialize, Serialize};

/// Supplies the item that follows a naturally finished on-demand item
pub trait EpisodeResolver: Send {
    fn next_after(&self, current: &PlaybackItem) -> Option<PlaybackItem>;
}

impl<F> EpisodeResolver for F
where
    F: Fn(&PlaybackItem) -> Option<PlaybackItem> + Send,
{
    fn next_after(&self, current: &PlaybackItem) -> Option<PlaybackItem> {
        self(current)
    }
}

/// One episode of a show
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeEntry {
    pub season: u32,
    pub episode: u32,
    pub item: PlaybackItem,
}

/// Season/episode ordered sequence of one show
#[derive(Debug, Clone, Default)]
pub struct EpisodeIndex {
    episodes: Vec<EpisodeEntry>,
}

impl EpisodeIndex {
    pub fn new(mut episodes: Vec<EpisodeEntry>) -> Self {
        episodes.sort_by_key(|e| (e.season, e.episode));
        Self { episodes }
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }
}

impl EpisodeResolver for EpisodeIndex {
    fn next_after(&self, current: &PlaybackItem) -> Option<PlaybackItem> {
        let position = self
            .episodes
            .iter()
            .position(|e| e.item.key() == current.key())?;
        self.episodes.get(position + 1).map(|e| e.item.clone())
    }
}
