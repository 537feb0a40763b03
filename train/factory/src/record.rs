use serde::Serialize;

use crate::annotation::AnnotatedImage;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Center {
    pub x: f64,
    pub y: f64,
}

/// One line of `labels.jsonl`.
#[derive(Serialize, Debug)]
pub struct JsonRecord {
    pub schema: &'static str,
    pub index: usize,
    pub image: String,
    pub width: u32,
    pub height: u32,
    pub center: Center,
    /// `[w, x, y, z]`
    pub rotation: [f64; 4],
    pub visible: bool,
}

impl JsonRecord {
    pub fn image_path(index: usize) -> String {
        format!("images/{index:06}.png")
    }

    pub fn from_annotated(item: &AnnotatedImage) -> Self {
        let ann = item.annotations();
        let q = ann.rotation.quaternion();
        Self {
            schema: "v1",
            index: item.index(),
            image: Self::image_path(item.index()),
            width: item.image().width(),
            height: item.image().height(),
            center: Center {
                x: ann.center.x,
                y: ann.center.y,
            },
            rotation: [q.w, q.i, q.j, q.k],
            visible: ann.visible,
        }
    }
}
