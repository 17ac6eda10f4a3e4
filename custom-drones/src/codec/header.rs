// Copyright 2025 John Brosnihan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Fixed header fields shared by every custom drone record

use std::fmt;

/// Three `f32` components, used for positions and euler rotations in degrees
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// The origin
    pub const ZERO: Vec3 = Vec3 { x: 0.0, y: 0.0, z: 0.0 };

    /// Create a new vector
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Vec3 { x, y, z }
    }
}

impl std::ops::Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl fmt::Display for Vec3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }
}

/// Decoded header of a data buffer
///
/// The identifier is kept in its stored form: printable ASCII, no zero bytes,
/// at most [`IDENTIFIER_MAX`](super::IDENTIFIER_MAX) characters. Use
/// [`sanitize_identifier`] before assigning arbitrary input.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// CRC-32 of the registered type name
    pub type_tag: u32,
    /// Owning player, 0 when unowned
    pub owner: u64,
    /// Health as a fraction of maximum (0..1)
    pub health: f32,
    /// World position
    pub position: Vec3,
    /// Euler rotation in degrees
    pub rotation: Vec3,
    /// Short remote-control identifier
    pub identifier: String,
}

impl Header {
    /// Header for a freshly placed drone of the given type
    pub fn new(type_tag: u32) -> Self {
        Header {
            type_tag,
            owner: 0,
            health: 1.0,
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            identifier: String::new(),
        }
    }
}

/// Reduce an identifier to the form the codec can store verbatim
///
/// Non-ASCII characters and NUL are dropped, then the result is truncated to
/// [`IDENTIFIER_MAX`](super::IDENTIFIER_MAX) bytes.
pub fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .chars()
        .filter(|c| c.is_ascii() && *c != '\0')
        .take(super::IDENTIFIER_MAX)
        .collect()
}
