use berth_runtime::{EngineGateway, RuntimeError};
use berth_schema::{Image, ImageHistoryEntry, ImageId};
use std::collections::HashMap;

/// List top-level images and add every intermediate layer their history
/// references, so containers built on an untagged layer still resolve.
///
/// A failed listing is an error; a failed history lookup only skips that
/// image's layers.
pub async fn build_image_set(
    gateway: &dyn EngineGateway,
) -> Result<HashMap<ImageId, Image>, RuntimeError> {
    let listed = gateway.list_images().await?;

    let mut histories = Vec::with_capacity(listed.len());
    for image in &listed {
        match gateway.image_history(&image.id).await {
            Ok(history) => histories.push(history),
            Err(e) => tracing::warn!("history of image {} unavailable: {e}", image.id.short()),
        }
    }

    let images = merge_lineage(listed, &histories);
    tracing::debug!("image set built: {} entries", images.len());
    Ok(images)
}

/// Pure half of `build_image_set`: the first occurrence of an id wins, and
/// history rows without an addressable id are ignored.
pub fn merge_lineage(
    listed: Vec<Image>,
    histories: &[Vec<ImageHistoryEntry>],
) -> HashMap<ImageId, Image> {
    let mut images: HashMap<ImageId, Image> = HashMap::with_capacity(listed.len());
    for image in listed {
        images.entry(image.id.clone()).or_insert(image);
    }

    for layer in histories.iter().flatten() {
        if !layer.is_addressable() {
            continue;
        }
        images
            .entry(ImageId::new(layer.id.clone()))
            .or_insert_with(|| Image::intermediate(layer.id.clone(), layer.size));
    }
    images
}
