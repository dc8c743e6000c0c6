use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::BTreeMap;

use crate::models::PixelBox;

/// A connected blob of foreground pixels
#[derive(Debug, Clone, PartialEq)]
pub struct InkBlob {
    pub label: u32,
    pub bbox: PixelBox,
    pub pixel_count: u32,
}

impl InkBlob {
    pub fn width(&self) -> u32 {
        self.bbox.width()
    }

    pub fn height(&self) -> u32 {
        self.bbox.height()
    }
}

/// Find blobs in a binary mask (non-zero = ink) using connected components.
///
/// Blobs are returned in label order, i.e. by first pixel in scan order.
pub fn find_blobs(mask: &GrayImage, min_area: u32) -> Vec<InkBlob> {
    let labeled = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut regions: BTreeMap<u32, (PixelBox, u32)> = BTreeMap::new();
    for (x, y, label) in labeled.enumerate_pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue;
        }

        regions
            .entry(label_val)
            .and_modify(|(bbox, count)| {
                bbox.include(x, y);
                *count += 1;
            })
            .or_insert((PixelBox::at(x, y), 1));
    }

    regions
        .into_iter()
        .map(|(label, (bbox, pixel_count))| InkBlob { label, bbox, pixel_count })
        .filter(|b| b.pixel_count >= min_area)
        .collect()
}

/// Union of the blob boxes, if any
pub fn union_box(blobs: &[InkBlob]) -> Option<PixelBox> {
    let mut iter = blobs.iter();
    let mut acc = iter.next()?.bbox;
    for blob in iter {
        acc.include(blob.bbox.left, blob.bbox.top);
        acc.include(blob.bbox.right, blob.bbox.bottom);
    }
    Some(acc)
}
