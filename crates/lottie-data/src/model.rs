use serde::{de::DeserializeOwned, de::SeqAccess, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Root of a decoded Bodymovin document.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct LottieJson {
    pub v: Option<String>,
    #[serde(default)]
    pub nm: Option<String>,
    pub ip: f32,
    pub op: f32,
    pub fr: f32,
    pub w: u32,
    pub h: u32,
    pub layers: Vec<Layer>,
    #[serde(default)]
    pub assets: Vec<Asset>,
    #[serde(default)]
    pub markers: Vec<Marker>,
}

impl LottieJson {
    pub fn asset(&self, id: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.id == id)
    }

    pub fn marker(&self, name: &str) -> Option<&Marker> {
        self.markers
            .iter()
            .find(|m| m.cm.as_deref() == Some(name))
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Layer {
    #[serde(default)]
    pub ty: u8, // 0=precomp 1=solid 2=image 3=null 4=shape 5=text
    #[serde(default)]
    pub ind: Option<u32>,
    #[serde(default)]
    pub parent: Option<u32>,
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub ip: f32,
    #[serde(default)]
    pub op: f32,
    #[serde(default)]
    pub st: f32,
    #[serde(default = "default_one")]
    pub sr: f32, // >1 plays slower
    #[serde(default)]
    pub ks: Transform,
    #[serde(default)]
    pub ao: Option<u32>,
    #[serde(default)]
    pub tm: Option<Property<f32>>, // Time remap, in seconds
    #[serde(default)]
    pub hd: Option<bool>,

    #[serde(default, rename = "masksProperties")]
    pub masks_properties: Option<Vec<MaskProperties>>,
    #[serde(default)]
    pub tt: Option<u8>, // 1=alpha 2=inverted alpha 3=luma 4=inverted luma
    #[serde(default)]
    pub tp: Option<u32>,
    #[serde(default)]
    pub td: Option<u8>,
    #[serde(default)]
    pub bm: Option<u8>,

    #[serde(default, rename = "refId")]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub w: Option<u32>,
    #[serde(default)]
    pub h: Option<u32>,
    #[serde(default, rename = "sc")]
    pub color: Option<String>,
    #[serde(default)]
    pub sw: Option<u32>,
    #[serde(default)]
    pub sh: Option<u32>,
    #[serde(default)]
    pub shapes: Option<Vec<Shape>>,
    #[serde(default)]
    pub t: Option<TextData>,
}

fn default_one() -> f32 {
    1.0
}

impl Layer {
    pub fn name(&self) -> &str {
        self.nm.as_deref().unwrap_or("")
    }

    pub fn is_hidden(&self) -> bool {
        self.hd.unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MaskProperties {
    #[serde(default)]
    pub inv: bool,
    #[serde(default)]
    pub mode: Option<String>, // a s i l d f n
    pub pt: Property<BezierPath>,
    #[serde(default)]
    pub o: Property<f32>,
    #[serde(default)]
    pub x: Property<f32>,
    #[serde(default)]
    pub nm: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "ty")]
pub enum Shape {
    #[serde(rename = "gr")]
    Group(GroupShape),
    #[serde(rename = "rc")]
    Rect(RectShape),
    #[serde(rename = "el")]
    Ellipse(EllipseShape),
    #[serde(rename = "fl")]
    Fill(FillShape),
    #[serde(rename = "st")]
    Stroke(StrokeShape),
    #[serde(rename = "gf")]
    GradientFill(GradientFillShape),
    #[serde(rename = "gs")]
    GradientStroke(GradientStrokeShape),
    #[serde(rename = "tr")]
    Transform(TransformShape),
    #[serde(rename = "sh")]
    Path(PathShape),
    #[serde(rename = "tm")]
    Trim(TrimShape),
    #[serde(rename = "sr")]
    Polystar(PolystarShape),
    #[serde(rename = "rp")]
    Repeater(RepeaterShape),
    #[serde(rename = "mm")]
    MergePaths(MergePathsShape),
    #[serde(other)]
    Unknown,
}

impl Shape {
    /// The `ty` tag this item was decoded from.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Shape::Group(_) => "gr",
            Shape::Rect(_) => "rc",
            Shape::Ellipse(_) => "el",
            Shape::Fill(_) => "fl",
            Shape::Stroke(_) => "st",
            Shape::GradientFill(_) => "gf",
            Shape::GradientStroke(_) => "gs",
            Shape::Transform(_) => "tr",
            Shape::Path(_) => "sh",
            Shape::Trim(_) => "tm",
            Shape::Polystar(_) => "sr",
            Shape::Repeater(_) => "rp",
            Shape::MergePaths(_) => "mm",
            Shape::Unknown => "??",
        }
    }

    pub fn is_hidden(&self) -> bool {
        let hd = match self {
            Shape::Group(s) => s.hd,
            Shape::Rect(s) => s.hd,
            Shape::Ellipse(s) => s.hd,
            Shape::Fill(s) => s.hd,
            Shape::Stroke(s) => s.hd,
            Shape::GradientFill(s) => s.hd,
            Shape::GradientStroke(s) => s.hd,
            Shape::Path(s) => s.hd,
            Shape::Polystar(s) => s.hd,
            _ => None,
        };
        hd.unwrap_or(false)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MergePathsShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub mm: u8,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PolystarShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub hd: Option<bool>,
    #[serde(default)]
    pub d: Option<u8>,
    pub p: PositionProperty,
    pub or: Property<f32>,
    #[serde(default)]
    pub os: Property<f32>,
    #[serde(default)]
    pub r: Property<f32>,
    pub pt: Property<f32>,
    #[serde(default)]
    pub sy: u8, // 1=star 2=polygon
    #[serde(default)]
    pub ir: Option<Property<f32>>,
    #[serde(default)]
    pub is: Option<Property<f32>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RepeaterShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub c: Property<f32>,
    #[serde(default)]
    pub o: Property<f32>,
    #[serde(default)]
    pub m: u8, // 1=above 2=below
    pub tr: RepeaterTransform,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RepeaterTransform {
    #[serde(flatten)]
    pub t: Transform,
    #[serde(default)]
    pub so: Property<f32>,
    #[serde(default)]
    pub eo: Property<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GroupShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub hd: Option<bool>,
    #[serde(default)]
    pub it: Vec<Shape>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RectShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub hd: Option<bool>,
    #[serde(default)]
    pub d: Option<u8>,
    pub s: Property<Vec2>,
    pub p: Property<Vec2>,
    #[serde(default)]
    pub r: Property<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct EllipseShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub hd: Option<bool>,
    #[serde(default)]
    pub d: Option<u8>,
    pub s: Property<Vec2>,
    pub p: Property<Vec2>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FillShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub hd: Option<bool>,
    pub c: Property<Vec4>,
    pub o: Property<f32>,
    #[serde(default)]
    pub r: Option<u8>, // 1=non-zero 2=even-odd
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StrokeShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub hd: Option<bool>,
    pub c: Property<Vec4>,
    pub w: Property<f32>,
    pub o: Property<f32>,
    #[serde(default)]
    pub lc: u8,
    #[serde(default)]
    pub lj: u8,
    #[serde(default)]
    pub ml: Option<f32>,
    #[serde(default)]
    pub d: Vec<DashProperty>,
}

/// One entry of a stroke's dash array. `n` is `d` (dash), `g` (gap) or `o` (offset).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DashProperty {
    #[serde(default)]
    pub n: Option<String>,
    pub v: Property<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GradientFillShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub hd: Option<bool>,
    pub o: Property<f32>,
    pub s: Property<Vec2>,
    pub e: Property<Vec2>,
    pub t: u8, // 1=linear 2=radial
    pub g: GradientColors,
    #[serde(default)]
    pub r: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct GradientStrokeShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub hd: Option<bool>,
    pub o: Property<f32>,
    pub w: Property<f32>,
    pub s: Property<Vec2>,
    pub e: Property<Vec2>,
    pub t: u8,
    pub g: GradientColors,
    #[serde(default)]
    pub lc: u8,
    #[serde(default)]
    pub lj: u8,
    #[serde(default)]
    pub ml: Option<f32>,
    #[serde(default)]
    pub d: Vec<DashProperty>,
}

/// `p` is the number of colour stops; `k` holds `p * 4` colour numbers
/// optionally followed by `(offset, alpha)` pairs.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct GradientColors {
    pub p: u32,
    pub k: Property<Vec<f32>>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PathShape {
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub hd: Option<bool>,
    #[serde(default)]
    pub d: Option<u8>,
    pub ks: Property<BezierPath>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TrimShape {
    #[serde(default)]
    pub nm: Option<String>,
    pub s: Property<f32>,
    pub e: Property<f32>,
    #[serde(default)]
    pub o: Property<f32>,
    #[serde(default)]
    pub m: u8, // 1=simultaneous 2=individual
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TransformShape {
    #[serde(flatten)]
    pub t: Transform,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Transform {
    #[serde(default)]
    pub a: Property<Vec3DefaultZero>,
    #[serde(default)]
    pub p: PositionProperty,
    #[serde(default)]
    pub s: Property<Vec3Scale>,
    #[serde(default, alias = "r")]
    pub rz: Property<f32>,
    #[serde(default)]
    pub sk: Property<f32>,
    #[serde(default)]
    pub sa: Property<f32>,
    #[serde(default)]
    pub o: Property<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum PositionProperty {
    Unified(Property<Vec3DefaultZero>),
    Split {
        x: Property<f32>,
        y: Property<f32>,
    },
}

impl Default for PositionProperty {
    fn default() -> Self {
        PositionProperty::Unified(Property::default())
    }
}

/// An animatable value. `k` is either a constant or a keyframe list; `a`
/// is the authoring tool's animated flag and is not trusted.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Property<T> {
    #[serde(default)]
    pub a: u8,
    #[serde(default)]
    #[serde(bound(deserialize = "T: DeserializeOwned"))]
    pub k: Value<T>,
    #[serde(default)]
    pub ix: Option<u32>,
    #[serde(default)]
    pub x: Option<String>,
}

impl<T> Default for Property<T> {
    fn default() -> Self {
        Property {
            a: 0,
            k: Value::Default,
            ix: None,
            x: None,
        }
    }
}

impl<T> Property<T> {
    pub fn constant(value: T) -> Self {
        Property {
            a: 0,
            k: Value::Static(value),
            ix: None,
            x: None,
        }
    }

    /// True when the property carries more than one keyframe.
    pub fn is_animated(&self) -> bool {
        matches!(&self.k, Value::Animated(kfs) if kfs.len() > 1)
    }
}

#[derive(Debug, Serialize, Clone)]
pub enum Value<T> {
    Default,
    Static(T),
    Animated(Vec<Keyframe<T>>),
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for Value<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = serde_json::Value::deserialize(deserializer)?;

        if v.is_null() {
            return Ok(Value::Default);
        }

        // Keyframe lists are arrays of objects carrying `t`; plain numeric
        // arrays must fall through to the static branch.
        let looks_keyframed = v
            .as_array()
            .and_then(|arr| arr.first())
            .map(|first| first.get("t").is_some())
            .unwrap_or(false);
        if looks_keyframed {
            if let Ok(keyframes) = serde_json::from_value::<Vec<Keyframe<T>>>(v.clone()) {
                return Ok(Value::Animated(keyframes));
            }
        }

        if let Ok(val) = serde_json::from_value::<T>(v.clone()) {
            return Ok(Value::Static(val));
        }

        if let Ok(vec) = serde_json::from_value::<Vec<T>>(v) {
            if let Some(first) = vec.into_iter().next() {
                return Ok(Value::Static(first));
            }
        }

        Ok(Value::Default)
    }
}

impl<T> Default for Value<T> {
    fn default() -> Self {
        Value::Default
    }
}

/// Keyframe as authored. `i`/`o` ease the segment that starts at this
/// keyframe; `e` is the legacy explicit end value of that segment.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(bound(deserialize = "T: DeserializeOwned"))]
pub struct Keyframe<T> {
    pub t: f32,
    #[serde(default, deserialize_with = "deserialize_keyframe_value")]
    pub s: Option<T>,
    #[serde(default, deserialize_with = "deserialize_keyframe_value")]
    pub e: Option<T>,
    #[serde(default)]
    pub i: Option<BezierTangent>,
    #[serde(default)]
    pub o: Option<BezierTangent>,
    #[serde(default)]
    pub to: Option<Vec<f32>>,
    #[serde(default)]
    pub ti: Option<Vec<f32>>,
    #[serde(default)]
    pub h: Option<u8>,
}

fn deserialize_keyframe_value<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let v = serde_json::Value::deserialize(deserializer)?;
    if v.is_null() {
        return Ok(None);
    }

    if let Ok(val) = serde_json::from_value(v.clone()) {
        return Ok(Some(val));
    }

    // Scalars are sometimes wrapped in a one-element array.
    if let Ok(vec) = serde_json::from_value::<Vec<T>>(v) {
        if let Some(first) = vec.into_iter().next() {
            return Ok(Some(first));
        }
    }

    Ok(None)
}

pub type Vec2 = [f32; 2];
pub type Vec3 = [f32; 3];
pub type Vec4 = [f32; 4];

/// Easing control point, e.g. `{"x": [0.48], "y": [1]}`. Multi-dimensional
/// properties may carry one component per dimension.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct BezierTangent {
    #[serde(deserialize_with = "deserialize_components")]
    pub x: Vec<f32>,
    #[serde(deserialize_with = "deserialize_components")]
    pub y: Vec<f32>,
}

fn deserialize_components<'de, D>(deserializer: D) -> Result<Vec<f32>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Components {
        One(f32),
        Many(Vec<f32>),
    }
    Ok(match Components::deserialize(deserializer)? {
        Components::One(v) => vec![v],
        Components::Many(v) => v,
    })
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Vec3DefaultZero(pub Vec3);

impl Default for Vec3DefaultZero {
    fn default() -> Self {
        Vec3DefaultZero([0.0, 0.0, 0.0])
    }
}

impl<'de> Deserialize<'de> for Vec3DefaultZero {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer
            .deserialize_seq(PaddedVec3Visitor { fill_z: 0.0 })
            .map(Vec3DefaultZero)
    }
}

/// Scale in percent; a missing z reads as 100.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Vec3Scale(pub Vec3);

impl Default for Vec3Scale {
    fn default() -> Self {
        Vec3Scale([100.0, 100.0, 100.0])
    }
}

impl<'de> Deserialize<'de> for Vec3Scale {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer
            .deserialize_seq(PaddedVec3Visitor { fill_z: 100.0 })
            .map(Vec3Scale)
    }
}

struct PaddedVec3Visitor {
    fill_z: f32,
}

impl<'de> serde::de::Visitor<'de> for PaddedVec3Visitor {
    type Value = Vec3;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a sequence of 2 or 3 floats")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let x = seq.next_element()?.unwrap_or(0.0);
        let y = seq.next_element()?.unwrap_or(0.0);
        let z = seq.next_element()?.unwrap_or(self.fill_z);
        while seq.next_element::<f32>()?.is_some() {}
        Ok([x, y, z])
    }
}

/// Path vertices with tangents relative to their vertex.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BezierPath {
    #[serde(default)]
    pub c: bool,
    #[serde(default)]
    pub i: Vec<Vec2>,
    #[serde(default)]
    pub o: Vec<Vec2>,
    #[serde(default)]
    pub v: Vec<Vec2>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Asset {
    pub id: String,
    #[serde(default)]
    pub nm: Option<String>,
    #[serde(default)]
    pub layers: Option<Vec<Layer>>,
    #[serde(default)]
    pub w: Option<u32>,
    #[serde(default)]
    pub h: Option<u32>,
    #[serde(default)]
    pub u: Option<String>,
    #[serde(default)]
    pub p: Option<String>,
    #[serde(default)]
    pub e: Option<u8>, // 1 when `p` is embedded data
}

impl Asset {
    pub fn is_precomposition(&self) -> bool {
        self.layers.is_some()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct Marker {
    #[serde(default)]
    pub cm: Option<String>,
    #[serde(default)]
    pub tm: Option<f32>,
    #[serde(default)]
    pub dr: Option<f32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TextData {
    pub d: Property<TextDocument>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct TextDocument {
    #[serde(default)]
    pub t: String,
    #[serde(default)]
    pub f: String,
    #[serde(default)]
    pub s: f32,
    #[serde(default)]
    pub j: u8, // 0=left 1=right 2=center
    #[serde(default)]
    pub tr: f32,
    #[serde(default)]
    pub lh: f32,
    #[serde(default)]
    pub fc: Vec4,
    #[serde(default)]
    pub sc: Option<Vec4>,
    #[serde(default)]
    pub sw: Option<f32>,
    #[serde(default)]
    pub sz: Option<Vec2>,
    #[serde(default)]
    pub ps: Option<Vec2>,
}
