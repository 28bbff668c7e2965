use super::Fault;

type Result<T> = std::result::Result<T, Fault>;

/// ## Stack enforced and size limited vector

pub struct Stack<T> {
    limit: usize,
    vec: Vec<T>,
}

impl<T: std::fmt::Debug> std::fmt::Debug for Stack<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.vec)
    }
}

impl<T: Copy> Stack<T> {
    pub fn new(limit: usize) -> Stack<T> {
        Stack { limit, vec: vec![] }
    }
    pub fn clear(&mut self) {
        self.vec.clear()
    }
    pub fn len(&self) -> usize {
        self.vec.len()
    }
    pub fn is_empty(&self) -> bool {
        self.vec.is_empty()
    }
    pub fn last(&self) -> Result<T> {
        match self.vec.last() {
            Some(v) => Ok(*v),
            None => Err(Fault::StackUnderflow),
        }
    }
    pub fn as_slice(&self) -> &[T] {
        &self.vec
    }
    pub fn push(&mut self, val: T) -> Result<()> {
        if self.vec.len() >= self.limit {
            return Err(Fault::StackOverflow);
        }
        self.vec.push(val);
        Ok(())
    }
    pub fn pop(&mut self) -> Result<T> {
        match self.vec.pop() {
            Some(v) => Ok(v),
            None => Err(Fault::StackUnderflow),
        }
    }
    pub fn pop_2(&mut self) -> Result<(T, T)> {
        let two = self.pop()?;
        let one = self.pop()?;
        Ok((one, two))
    }
    /// The `len` values below the top `skip` values, oldest first,
    /// left in place.
    pub fn window(&self, skip: usize, len: usize) -> Result<&[T]> {
        let end = self
            .vec
            .len()
            .checked_sub(skip)
            .ok_or(Fault::StackUnderflow)?;
        let start = end.checked_sub(len).ok_or(Fault::StackUnderflow)?;
        Ok(&self.vec[start..end])
    }
    pub fn drop_n(&mut self, len: usize) -> Result<()> {
        let keep = self
            .vec
            .len()
            .checked_sub(len)
            .ok_or(Fault::StackUnderflow)?;
        self.vec.truncate(keep);
        Ok(())
    }
}
