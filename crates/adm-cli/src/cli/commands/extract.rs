//! `adm extract` – print the normalized video URLs found in text.

use adm_core::url_model::{UrlExtractor, YoutubeUrlExtractor};
use anyhow::Result;
use std::collections::HashSet;

use super::read_input;

pub(crate) fn unique_urls(blocks: &[String]) -> Vec<String> {
    let extractor = YoutubeUrlExtractor;
    let mut seen = HashSet::new();
    blocks
        .iter()
        .flat_map(|b| extractor.extract(b))
        .filter(|u| seen.insert(u.clone()))
        .collect()
}

pub async fn run_extract(text: &[String]) -> Result<()> {
    let blocks = read_input(text, None).await?;
    let urls = unique_urls(&blocks);
    if urls.is_empty() {
        println!("No video URLs found.");
    }
    for url in urls {
        println!("{url}");
    }
    Ok(())
}
