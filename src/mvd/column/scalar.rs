use std::collections::HashSet;
use std::sync::Arc;

use log::trace;

use crate::mvd::container::{ColumnData, Container, read_plan};
use crate::mvd::types::error::{MvdError, Result};
use crate::mvd::types::models::{DataType, Value};
use crate::mvd::types::selection::{ReadPlan, Selected, Selector};

/// Where the values of a [`ScalarColumn`] come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScalarSource {
    /// One dataset holding `width` values per row.
    Dataset(String),
    /// One single-valued dataset per component, e.g. `x`, `y`, `z`.
    Components(Vec<String>),
    /// Rotation angles in radians around each axis, turned into `(x, y, z, w)`
    /// quaternions. Missing axes count as 0.
    EulerAngles {
        x: Option<String>,
        y: Option<String>,
        z: Option<String>,
    },
}

/// A dense per-cell column: numbers, plain strings or fixed-width rows.
#[derive(Debug, Clone)]
pub struct ScalarColumn {
    name: String,
    store: Arc<dyn Container>,
    source: ScalarSource,
    dtype: DataType,
    width: usize,
    len: usize,
}

impl ScalarColumn {
    /// A column backed by the single dataset at `path`.
    pub fn dataset(store: Arc<dyn Container>, name: &str, path: &str, len: usize) -> Result<Self> {
        let info = store
            .dataset(path)
            .ok_or_else(|| MvdError::AttributeNotFound(path.to_string()))?;
        check_rows(path, info.rows, len)?;
        Ok(Self {
            name: name.to_string(),
            store,
            source: ScalarSource::Dataset(path.to_string()),
            dtype: info.dtype,
            width: info.width,
            len,
        })
    }

    /// A float row column assembled from parallel single-valued datasets.
    pub fn components(
        store: Arc<dyn Container>,
        name: &str,
        paths: Vec<String>,
        len: usize,
    ) -> Result<Self> {
        for path in &paths {
            check_numeric_component(store.as_ref(), path, len)?;
        }
        Ok(Self {
            name: name.to_string(),
            store,
            width: paths.len(),
            source: ScalarSource::Components(paths),
            dtype: DataType::Float,
            len,
        })
    }

    /// A quaternion column derived from per-axis rotation angles.
    pub fn euler_angles(
        store: Arc<dyn Container>,
        name: &str,
        x: Option<String>,
        y: Option<String>,
        z: Option<String>,
        len: usize,
    ) -> Result<Self> {
        let axes = [&x, &y, &z];
        if axes.iter().all(|axis| axis.is_none()) {
            return Err(MvdError::AttributeNotFound(name.to_string()));
        }
        for path in axes.into_iter().flatten() {
            check_numeric_component(store.as_ref(), path, len)?;
        }
        Ok(Self {
            name: name.to_string(),
            store,
            source: ScalarSource::EulerAngles { x, y, z },
            dtype: DataType::Float,
            width: 4,
            len,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Values per cell.
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn source(&self) -> &ScalarSource {
        &self.source
    }

    /// Numeric values of a single-valued column. Integers are widened.
    pub fn floats(&self, selector: &Selector) -> Result<Selected<f64>> {
        if self.width != 1 {
            return Err(self.mismatch("a single value per cell"));
        }
        let plan = selector.plan(self.len)?;
        let values = self.read(&plan)?.into_floats(&self.name)?;
        plan.finish(values)
    }

    /// Fixed-width float rows. A single selected cell still yields a `[f64; W]`.
    pub fn rows<const W: usize>(&self, selector: &Selector) -> Result<Selected<[f64; W]>> {
        if self.width != W {
            return Err(self.mismatch("rows of this width"));
        }
        let plan = selector.plan(self.len)?;
        let values = self.read(&plan)?.into_floats(&self.name)?;
        let rows = values
            .chunks_exact(W)
            .map(|chunk| {
                <[f64; W]>::try_from(chunk)
                    .map_err(|_| MvdError::InvalidFormat(format!("Short row in '{}'", self.name)))
            })
            .collect::<Result<Vec<_>>>()?;
        plan.finish(rows)
    }

    /// String view of a single-valued column. Integer codes are formatted in
    /// decimal; float columns are rejected.
    pub fn texts(&self, selector: &Selector) -> Result<Selected<String>> {
        if self.width != 1 {
            return Err(self.mismatch("text"));
        }
        let plan = selector.plan(self.len)?;
        let values = match self.read(&plan)? {
            ColumnData::Text(values) => values,
            ColumnData::Int(values) => values.into_iter().map(|v| v.to_string()).collect(),
            ColumnData::Float(_) => return Err(self.mismatch("text")),
        };
        plan.finish(values)
    }

    /// Type-erased values; multi-valued rows become [`Value::Vector`].
    pub fn values(&self, selector: &Selector) -> Result<Selected<Value>> {
        let plan = selector.plan(self.len)?;
        let data = self.read(&plan)?;
        let values = if self.width == 1 {
            match data {
                ColumnData::Int(values) => values.into_iter().map(Value::Int).collect(),
                ColumnData::Float(values) => values.into_iter().map(Value::Float).collect(),
                ColumnData::Text(values) => values.into_iter().map(Value::Text).collect(),
            }
        } else {
            data.into_floats(&self.name)?
                .chunks_exact(self.width)
                .map(|row| Value::Vector(row.to_vec()))
                .collect()
        };
        plan.finish(values)
    }

    /// Distinct values of the whole column in first-occurrence order.
    ///
    /// Reads every row.
    pub fn distinct_texts(&self) -> Result<Vec<String>> {
        let values = self.texts(&Selector::All)?.into_vec();
        let mut seen = HashSet::new();
        Ok(values.into_iter().filter(|value| seen.insert(value.clone())).collect())
    }

    /// Reads the planned rows, flattened row-major.
    fn read(&self, plan: &ReadPlan) -> Result<ColumnData> {
        trace!("Reading {} rows of '{}'", plan.count(), self.name);
        match &self.source {
            ScalarSource::Dataset(path) => read_plan(self.store.as_ref(), path, plan),
            ScalarSource::Components(paths) => {
                let components = paths
                    .iter()
                    .map(|path| read_plan(self.store.as_ref(), path, plan)?.into_floats(path))
                    .collect::<Result<Vec<_>>>()?;
                let rows = plan.count();
                let mut out = Vec::with_capacity(rows * components.len());
                for row in 0..rows {
                    out.extend(components.iter().map(|component| component[row]));
                }
                Ok(ColumnData::Float(out))
            }
            ScalarSource::EulerAngles { x, y, z } => {
                let rows = plan.count();
                let angles = |axis: &Option<String>| -> Result<Vec<f64>> {
                    match axis {
                        Some(path) => read_plan(self.store.as_ref(), path, plan)?.into_floats(path),
                        None => Ok(vec![0.0; rows]),
                    }
                };
                let (ax, ay, az) = (angles(x)?, angles(y)?, angles(z)?);
                let mut out = Vec::with_capacity(rows * 4);
                for row in 0..rows {
                    out.extend(euler_to_quaternion(ax[row], ay[row], az[row]));
                }
                Ok(ColumnData::Float(out))
            }
        }
    }

    fn mismatch(&self, expected: &'static str) -> MvdError {
        MvdError::TypeMismatch {
            name: self.name.clone(),
            expected,
        }
    }
}

fn check_rows(path: &str, rows: usize, len: usize) -> Result<()> {
    if rows != len {
        return Err(MvdError::InvalidFormat(format!(
            "Dataset '{}' has {} rows, expected {}",
            path, rows, len
        )));
    }
    Ok(())
}

fn check_numeric_component(store: &dyn Container, path: &str, len: usize) -> Result<()> {
    let info = store
        .dataset(path)
        .ok_or_else(|| MvdError::AttributeNotFound(path.to_string()))?;
    if info.width != 1 || info.dtype == DataType::Text {
        return Err(MvdError::TypeMismatch {
            name: path.to_string(),
            expected: "a single number per cell",
        });
    }
    check_rows(path, info.rows, len)
}

/// Quaternion `(x, y, z, w)` of the rotation `Rz(z) * Ry(y) * Rx(x)`, angles in radians.
pub fn euler_to_quaternion(x: f64, y: f64, z: f64) -> [f64; 4] {
    let axis = |angle: f64, component: usize| {
        let (sin, cos) = (angle / 2.0).sin_cos();
        let mut q = [0.0, 0.0, 0.0, cos];
        q[component] = sin;
        q
    };
    multiply(multiply(axis(z, 2), axis(y, 1)), axis(x, 0))
}

/// Hamilton product of two `(x, y, z, w)` quaternions.
fn multiply(a: [f64; 4], b: [f64; 4]) -> [f64; 4] {
    let [ax, ay, az, aw] = a;
    let [bx, by, bz, bw] = b;
    [
        aw * bx + ax * bw + ay * bz - az * by,
        aw * by - ax * bz + ay * bw + az * bx,
        aw * bz + ax * by - ay * bx + az * bw,
        aw * bw - ax * bx - ay * by - az * bz,
    ]
}
