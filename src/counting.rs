use std::fmt;

/// Pass-through [`fmt::Write`] that counts the characters written.
///
/// Every write is forwarded unchanged and immediately; nothing is
/// buffered. The count is of `char`s, so `count() * 4` bounds the UTF-8
/// byte length of what went through. A character outside the Basic
/// Multilingual Plane (`𝄞`) counts once, not as two UTF-16 units.
pub struct CountingSink<'a, W: fmt::Write + ?Sized> {
    inner: &'a mut W,
    count: usize,
}

impl<'a, W: fmt::Write + ?Sized> CountingSink<'a, W> {
    pub fn new(inner: &'a mut W) -> Self {
        Self { inner, count: 0 }
    }

    pub fn count(&self) -> usize {
        self.count
    }
}

impl<W: fmt::Write + ?Sized> fmt::Write for CountingSink<'_, W> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.inner.write_str(s)?;
        self.count += s.chars().count();
        Ok(())
    }

    fn write_char(&mut self, c: char) -> fmt::Result {
        self.inner.write_char(c)?;
        self.count += 1;
        Ok(())
    }
}

/// Sink that discards everything; paired with [`CountingSink`] to measure
/// an entry without keeping it.
#[derive(Debug, Default)]
pub(crate) struct Discard;

impl fmt::Write for Discard {
    fn write_str(&mut self, _s: &str) -> fmt::Result {
        Ok(())
    }
}
