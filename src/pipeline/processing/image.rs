use crate::types::ImageRef;

/// Chooses the URL that represents a record: the first image of the most
/// preferred variant present (original, medium thumbnail, small thumbnail,
/// unspecified), or `""` when there are no images.
pub fn select_image(images: &[ImageRef]) -> &str {
    images
        .iter()
        .filter(|image| !image.url.trim().is_empty())
        .min_by_key(|image| image.variant.rank())
        .map(|image| image.url.as_str())
        .unwrap_or("")
}
